//! Action catalogue and dispatch.
//!
//! Every action receives a [`QueryContext`] already routed to the correct
//! final hop and is free to issue reads ([`QueryContext::query`]) or
//! statements ([`QueryContext::execute`]); the action, not the core, decides
//! which semantics its SQL has.

mod enumeration;
mod exec;
mod sccm;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::context::QueryContext;

#[async_trait]
pub trait Action: Sync + Send {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Argument hint shown in the catalogue listing, empty when none.
    fn usage(&self) -> &'static str {
        ""
    }
    async fn run(&self, ctx: &mut QueryContext, args: &[String]) -> Result<()>;
}

pub fn catalogue() -> Vec<Box<dyn Action>> {
    vec![
        Box::new(enumeration::Whoami),
        Box::new(enumeration::Info),
        Box::new(enumeration::Links),
        Box::new(enumeration::Impersonation),
        Box::new(enumeration::Databases),
        Box::new(enumeration::Tables),
        Box::new(enumeration::Logins),
        Box::new(enumeration::RawQuery),
        Box::new(exec::XpCmd),
        Box::new(exec::OleCmd),
        Box::new(exec::AgentCmd),
        Box::new(exec::ConfigureOption),
        Box::new(exec::EnableRpc),
        Box::new(exec::DirTree),
        Box::new(sccm::Sites),
        Box::new(sccm::Clients),
        Box::new(sccm::Users),
        Box::new(sccm::Credentials),
        Box::new(sccm::TaskSequences),
        Box::new(sccm::Collections),
        Box::new(sccm::Admins),
    ]
}

pub fn print_catalogue() {
    let mut actions = catalogue();
    actions.sort_by_key(|a| a.name());
    println!("{:<22} {}", "ACTION", "DESCRIPTION");
    for action in actions {
        let usage = action.usage();
        let name = if usage.is_empty() {
            action.name().to_owned()
        } else {
            format!("{} {}", action.name(), usage)
        };
        println!("{:<22} {}", name, action.description());
    }
}

pub async fn dispatch(ctx: &mut QueryContext, name: &str, args: &[String]) -> Result<()> {
    let wanted = name.to_ascii_lowercase();
    match catalogue().into_iter().find(|a| a.name() == wanted) {
        Some(action) => action.run(ctx, args).await,
        None => bail!("unknown action '{name}' (run 'sqlhop --help' or the 'list' action)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn action_names_are_unique_and_lowercase() {
        let mut seen = HashSet::new();
        for action in catalogue() {
            assert_eq!(action.name(), action.name().to_ascii_lowercase());
            assert!(seen.insert(action.name()), "duplicate action {}", action.name());
            assert!(!action.description().is_empty());
        }
    }
}
