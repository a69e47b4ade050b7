//! Configuration Manager (SCCM) site database enumeration.
//!
//! These actions expect the connection (or chain) to land in a CM_<sitecode>
//! database; pass `--database CM_P01` or similar. All reads, no mutation.
//! Credential blobs (SC_UserAccount passwords, task sequence bodies) come
//! back encrypted with the site's master key; decryption happens offline.

use anyhow::Result;
use async_trait::async_trait;

use super::Action;
use crate::context::QueryContext;

pub struct Sites;

#[async_trait]
impl Action for Sites {
    fn name(&self) -> &'static str {
        "sccm-sites"
    }

    fn description(&self) -> &'static str {
        "sites known to this CM database"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT SiteCode, SiteName, ServerName, Version, Status FROM dbo.v_Site",
        )
        .await
    }
}

pub struct Clients;

#[async_trait]
impl Action for Clients {
    fn name(&self) -> &'static str {
        "sccm-clients"
    }

    fn description(&self) -> &'static str {
        "managed devices with last logon user and OS"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT ItemKey AS [id], Name0 AS [device], User_Name0 AS [last_user], \
             Operating_System_Name_and0 AS [os], Client_Version0 AS [client] \
             FROM dbo.v_R_System WHERE Client0 = 1",
        )
        .await
    }
}

pub struct Users;

#[async_trait]
impl Action for Users {
    fn name(&self) -> &'static str {
        "sccm-users"
    }

    fn description(&self) -> &'static str {
        "discovered user accounts"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT User_Name0 AS [user], Full_User_Name0 AS [full_name], \
             Mail0 AS [mail], Distinguished_Name0 AS [dn] FROM dbo.v_R_User",
        )
        .await
    }
}

/// Service accounts vaulted by the site (network access, client push, domain
/// join). Passwords come back encrypted.
pub struct Credentials;

#[async_trait]
impl Action for Credentials {
    fn name(&self) -> &'static str {
        "sccm-credentials"
    }

    fn description(&self) -> &'static str {
        "vaulted site accounts (passwords encrypted)"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT UserName AS [account], SiteCode, Availability, \
             Password AS [password_blob] FROM dbo.vSMS_SC_UserAccount",
        )
        .await
    }
}

/// Task sequences often embed credentials in their (encrypted) body.
pub struct TaskSequences;

#[async_trait]
impl Action for TaskSequences {
    fn name(&self) -> &'static str {
        "sccm-tasksequences"
    }

    fn description(&self) -> &'static str {
        "task sequence packages (bodies encrypted)"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT PkgID, Name, SourceDate, Sequence AS [sequence_blob] \
             FROM dbo.vSMS_TaskSequencePackage",
        )
        .await
    }
}

pub struct Collections;

#[async_trait]
impl Action for Collections {
    fn name(&self) -> &'static str {
        "sccm-collections"
    }

    fn description(&self) -> &'static str {
        "device/user collections and member counts"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT CollectionID, Name, MemberCount, CollectionType \
             FROM dbo.v_Collection ORDER BY MemberCount DESC",
        )
        .await
    }
}

pub struct Admins;

#[async_trait]
impl Action for Admins {
    fn name(&self) -> &'static str {
        "sccm-admins"
    }

    fn description(&self) -> &'static str {
        "RBAC administrative principals"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT AdminID, LogonName, DisplayName, IsGroup, IsDeleted \
             FROM dbo.RBAC_Admins",
        )
        .await
    }
}
