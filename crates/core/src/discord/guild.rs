//! A single guild seen through the [`Platform`] seam.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::info;

use super::client::{DiscordClient, GuildMember, GuildRole};
use crate::errors::{ApplyError, FetchError};
use crate::models::{Member, Role};
use crate::reconciler::Platform;

/// The guild being reconciled, bound to a client.
pub struct GuildPlatform {
    client: DiscordClient,
    guild_id: String,
    guild_name: String,
}

impl GuildPlatform {
    /// Bind to `guild_id`, or to the bot's first guild when none is given.
    pub async fn connect(client: DiscordClient, guild_id: Option<&str>) -> Result<Self, FetchError> {
        let guild = match guild_id {
            Some(id) => client.get_guild(id).await?,
            None => client.first_guild().await?,
        };
        info!(guild_id = %guild.id, guild = %guild.name, "bound to guild");
        Ok(Self {
            client,
            guild_id: guild.id,
            guild_name: guild.name,
        })
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    pub fn guild_name(&self) -> &str {
        &self.guild_name
    }
}

impl From<GuildMember> for Member {
    fn from(m: GuildMember) -> Self {
        Self {
            id: m.user.id,
            handle: m.user.username,
            alias: m.nick,
            roles: m.roles.into_iter().collect(),
        }
    }
}

impl From<GuildRole> for Role {
    fn from(r: GuildRole) -> Self {
        Self {
            id: r.id,
            name: r.name,
            managed: r.managed,
        }
    }
}

/// Role ids after applying `f` to the member's held set.
fn updated_roles(member: &Member, f: impl FnOnce(&mut BTreeSet<String>)) -> Vec<String> {
    let mut held = member.roles.clone();
    f(&mut held);
    held.into_iter().collect()
}

#[async_trait]
impl Platform for GuildPlatform {
    async fn fetch_roster(&self) -> Result<Vec<Member>, FetchError> {
        let members = self.client.list_members(&self.guild_id).await?;
        Ok(members.into_iter().map(Member::from).collect())
    }

    async fn fetch_role_catalog(&self) -> Result<Vec<Role>, FetchError> {
        let roles = self.client.list_roles(&self.guild_id).await?;
        Ok(roles.into_iter().map(Role::from).collect())
    }

    async fn add_roles(&self, member: &Member, roles: &[Role]) -> Result<(), ApplyError> {
        let ids = updated_roles(member, |held| {
            held.extend(roles.iter().map(|r| r.id.clone()));
        });
        self.client
            .set_member_roles(&self.guild_id, &member.id, &ids)
            .await?;
        Ok(())
    }

    async fn remove_roles(&self, member: &Member, roles: &[Role]) -> Result<(), ApplyError> {
        let ids = updated_roles(member, |held| {
            for role in roles {
                held.remove(&role.id);
            }
        });
        self.client
            .set_member_roles(&self.guild_id, &member.id, &ids)
            .await?;
        Ok(())
    }
}
