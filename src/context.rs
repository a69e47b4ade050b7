//! Live query context: one open connection plus the declared chain.
//!
//! Actions never see routing: reads go through [`QueryContext::query`] (which
//! wraps them in nested `OPENQUERY` when a chain is declared) and
//! state-changing statements go through [`QueryContext::execute`] (nested
//! `EXEC ... AT`, requiring RPC Out along the chain). Callers pick the method
//! matching their statement's semantics; the context does not inspect SQL
//! text to decide.

use anyhow::{bail, Context, Result};
use async_std::net::TcpStream;
use async_trait::async_trait;
use log::{debug, trace};
use tiberius::Client;

use crate::chain::builder::{build_query_chain, TraversalMode};
use crate::chain::traverse::{ProbeReply, ProbeRunner};
use crate::chain::ServerChain;
use crate::output::{OutputFormat, ResultTable};

pub struct QueryContext {
    client: Client<TcpStream>,
    chain: ServerChain,
    pub format: OutputFormat,
}

impl QueryContext {
    pub fn new(client: Client<TcpStream>, chain: ServerChain, format: OutputFormat) -> Self {
        Self { client, chain, format }
    }

    pub fn chain(&self) -> &ServerChain {
        &self.chain
    }

    fn route(&self, sql: &str, mode: TraversalMode) -> Result<String> {
        if self.chain.is_empty() {
            return Ok(sql.to_owned());
        }
        let routed = build_query_chain(&self.chain, sql, mode)?;
        trace!("routed statement: {routed}");
        Ok(routed)
    }

    /// Runs a read query at the final hop and materializes every result set.
    pub async fn query(&mut self, sql: &str) -> Result<Vec<ResultTable>> {
        let routed = self.route(sql, TraversalMode::ReadOnlyOpenQuery)?;
        debug!("query: {sql}");
        let stream = self.client.simple_query(routed).await?;
        let results = stream.into_results().await?;
        Ok(results.into_iter().map(ResultTable::from_rows).collect())
    }

    /// Runs a read query and returns the first column of the first row.
    pub async fn scalar(&mut self, sql: &str) -> Result<Option<String>> {
        let tables = self.query(sql).await?;
        Ok(tables
            .into_iter()
            .next()
            .and_then(|t| t.rows.into_iter().next())
            .and_then(|r| r.into_iter().next()))
    }

    /// Runs a statement with side effects at the final hop. Routed through
    /// `EXEC ... AT`, so every intermediate link needs RPC Out enabled.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        let routed = self.route(sql, TraversalMode::RemoteProcedureCall)?;
        debug!("execute: {sql}");
        let result = self.client.execute(routed, &[]).await?;
        Ok(result.total())
    }

    /// Renders each non-empty result set of a read query to stdout.
    pub async fn print_query(&mut self, sql: &str) -> Result<()> {
        let tables = self.query(sql).await?;
        let mut printed = false;
        for table in &tables {
            if table.is_empty() {
                continue;
            }
            println!("{}", table.render(self.format));
            printed = true;
        }
        if !printed {
            println!("(no rows)");
        }
        Ok(())
    }
}

#[async_trait]
impl ProbeRunner for QueryContext {
    /// Executes an already-routed probe statement. The traversal driver
    /// builds the prefix chain itself, so this goes straight to the wire
    /// without re-routing through the declared chain.
    async fn probe(&mut self, sql: &str) -> Result<ProbeReply> {
        let stream = self.client.simple_query(sql.to_owned()).await?;
        let rows = stream.into_first_result().await?;
        let row = match rows.first() {
            Some(row) => row,
            None => bail!("context probe returned no rows"),
        };

        let system_user: &str = row
            .try_get(0)?
            .context("context probe returned a NULL system user")?;
        let mapped_user: &str = row
            .try_get(1)?
            .context("context probe returned a NULL mapped user")?;
        let is_admin: i32 = row.try_get(2)?.unwrap_or(0);

        Ok(ProbeReply {
            system_user: system_user.to_owned(),
            mapped_user: mapped_user.to_owned(),
            is_admin: is_admin == 1,
        })
    }
}
