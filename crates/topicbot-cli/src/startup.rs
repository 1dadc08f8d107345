use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use topicbot_commands::CommandHandler;
use topicbot_gateway::{CodingBackend, RetryingGatewayClient};
use topicbot_session::{open_session_store, SessionStore};

use crate::{
    cli_args::Cli,
    console_transport::{run_console_loop, ConsoleReplyChannel},
};

pub(crate) struct GatewayRuntime {
    pub(crate) handler: CommandHandler,
    pub(crate) replies: Arc<ConsoleReplyChannel>,
}

/// Wires store, backend client and handler together from parsed flags.
pub(crate) fn build_runtime(cli: &Cli, replies: ConsoleReplyChannel) -> Result<GatewayRuntime> {
    let store: Arc<dyn SessionStore> = open_session_store(cli.session_store, &cli.session_db)
        .with_context(|| format!("failed to open {} session store", cli.session_store))?;
    let client = RetryingGatewayClient::new(cli.gateway_client_config())
        .context("failed to build backend client")?;
    tracing::info!(
        backend_url = %client.base_url(),
        session_store = %cli.session_store,
        command_prefix = %cli.command_prefix,
        "starting topic gateway"
    );
    let backend: Arc<dyn CodingBackend> = Arc::new(client);
    let replies = Arc::new(replies);
    let handler = CommandHandler::new(
        cli.command_gateway_config(),
        store,
        backend,
        replies.clone(),
    );
    Ok(GatewayRuntime { handler, replies })
}

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let runtime = build_runtime(&cli, ConsoleReplyChannel::stdout())?;
    let summary = run_console_loop(
        &runtime.handler,
        &runtime.replies,
        BufReader::new(tokio::io::stdin()),
    )
    .await?;
    tracing::info!(
        lines = summary.lines,
        replies = summary.replies,
        ignored = summary.ignored,
        deferred = summary.deferred,
        "console input closed"
    );
    Ok(())
}
