//! Read-only enumeration actions.

use anyhow::{bail, Result};
use async_trait::async_trait;
use log::info;

use super::Action;
use crate::context::QueryContext;

/// Current login, mapped database user, and role membership.
pub struct Whoami;

#[async_trait]
impl Action for Whoami {
    fn name(&self) -> &'static str {
        "whoami"
    }

    fn description(&self) -> &'static str {
        "current login, mapped user and server role membership"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT SYSTEM_USER AS [login], USER_NAME() AS [mapped_user], \
             IS_SRVROLEMEMBER('public') AS [public], \
             IS_SRVROLEMEMBER('sysadmin') AS [sysadmin]",
        )
        .await
    }
}

pub struct Info;

#[async_trait]
impl Action for Info {
    fn name(&self) -> &'static str {
        "info"
    }

    fn description(&self) -> &'static str {
        "server name, version, edition and current database"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT @@SERVERNAME AS [server], \
             CAST(SERVERPROPERTY('ProductVersion') AS NVARCHAR(64)) AS [version], \
             CAST(SERVERPROPERTY('Edition') AS NVARCHAR(128)) AS [edition], \
             DB_NAME() AS [database], \
             CAST(SERVERPROPERTY('IsClustered') AS INT) AS [clustered]",
        )
        .await
    }
}

/// Linked servers registered on the target, with their RPC Out flag; this is
/// where the next hop of a chain comes from.
pub struct Links;

#[async_trait]
impl Action for Links {
    fn name(&self) -> &'static str {
        "links"
    }

    fn description(&self) -> &'static str {
        "linked servers registered on the target"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT name AS [link], product, provider, data_source, \
             is_rpc_out_enabled AS [rpc_out], is_data_access_enabled AS [data_access] \
             FROM sys.servers WHERE is_linked = 1",
        )
        .await
    }
}

/// Logins the current principal holds IMPERSONATE on.
pub struct Impersonation;

#[async_trait]
impl Action for Impersonation {
    fn name(&self) -> &'static str {
        "impersonation"
    }

    fn description(&self) -> &'static str {
        "logins the current principal can impersonate"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT DISTINCT b.name AS [login] \
             FROM sys.server_permissions a \
             INNER JOIN sys.server_principals b ON a.grantor_principal_id = b.principal_id \
             WHERE a.permission_name = 'IMPERSONATE'",
        )
        .await
    }
}

pub struct Databases;

#[async_trait]
impl Action for Databases {
    fn name(&self) -> &'static str {
        "databases"
    }

    fn description(&self) -> &'static str {
        "databases, owners and trustworthy flags"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT name AS [database], SUSER_SNAME(owner_sid) AS [owner], \
             is_trustworthy_on AS [trustworthy], state_desc AS [state] \
             FROM sys.databases",
        )
        .await
    }
}

/// Tables of one database, passed as the single argument.
pub struct Tables;

#[async_trait]
impl Action for Tables {
    fn name(&self) -> &'static str {
        "tables"
    }

    fn description(&self) -> &'static str {
        "user tables of the given database"
    }

    fn usage(&self) -> &'static str {
        "<database>"
    }

    async fn run(&self, ctx: &mut QueryContext, args: &[String]) -> Result<()> {
        let database = match args.first() {
            Some(db) => db,
            None => bail!("tables requires a database name"),
        };
        if !database.chars().all(|c| c.is_alphanumeric() || c == '_') {
            bail!("database name '{database}' contains characters unsafe for identifier splicing");
        }
        let sql = format!(
            "SELECT TABLE_SCHEMA AS [schema], TABLE_NAME AS [table] \
             FROM [{database}].INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE'"
        );
        ctx.print_query(&sql).await
    }
}

pub struct Logins;

#[async_trait]
impl Action for Logins {
    fn name(&self) -> &'static str {
        "logins"
    }

    fn description(&self) -> &'static str {
        "SQL and Windows principals defined on the server"
    }

    async fn run(&self, ctx: &mut QueryContext, _args: &[String]) -> Result<()> {
        ctx.print_query(
            "SELECT name AS [principal], type_desc AS [type], is_disabled, create_date \
             FROM sys.server_principals WHERE type IN ('S','U','G') ORDER BY name",
        )
        .await
    }
}

/// Arbitrary read query taken verbatim from the trailing arguments.
pub struct RawQuery;

#[async_trait]
impl Action for RawQuery {
    fn name(&self) -> &'static str {
        "query"
    }

    fn description(&self) -> &'static str {
        "run a raw query at the final hop"
    }

    fn usage(&self) -> &'static str {
        "<sql...>"
    }

    async fn run(&self, ctx: &mut QueryContext, args: &[String]) -> Result<()> {
        if args.is_empty() {
            bail!("query requires the SQL text to run");
        }
        let sql = args.join(" ");
        info!("running user query at the final hop");
        ctx.print_query(&sql).await
    }
}
