//! Subcommand implementations.

use anyhow::{Context, Result};
use futures::StreamExt;
use pvectl_api::{Client, ClientConfig, MockTask, MockTransport, OperationOutcome, Task};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::Command;

/// Task served by the in-memory API in development mode.
pub const DEV_UPID: &str = "UPID:dev:00001F90:0001E240:6553F00D:qmstart:100:root@pam:";

/// Build a client backed by [`MockTransport`] with one scripted task that
/// runs for a few polls and finishes successfully. `upid` registers the same
/// task under a caller-supplied identifier.
pub fn dev_client(config: &ClientConfig, upid: Option<&str>) -> pvectl_api::error::Result<Client> {
    let mock = Arc::new(MockTransport::new());

    let script = || {
        let log = [
            "starting VM 100",
            "allocating memory",
            "attaching disks",
            "VM 100 started",
        ]
        .iter()
        .map(|line| line.to_string())
        .collect();
        MockTask::finished("OK", log).with_running_polls(3)
    };

    mock.add_task(DEV_UPID, script());
    if let Some(upid) = upid {
        mock.add_task(upid, script());
    }
    mock.queue_outcome(OperationOutcome::Accepted {
        upid: DEV_UPID.to_string(),
    });

    Client::with_transport(mock, config)
}

/// Execute a parsed subcommand.
pub async fn run(client: &Client, command: Command) -> Result<()> {
    match command {
        Command::Submit { path, params } => {
            let task = client
                .submit(&path, &params)
                .await
                .with_context(|| format!("Failed to submit {}", path))?;
            if !task.id().is_empty() {
                eprintln!("task {}", task.id());
            }
            follow(task.as_ref()).await
        }
        Command::Status { upid } => {
            let task = client.attach(&upid)?;
            let status = task.snapshot().await;
            print!("{}", serde_yaml::to_string(&status)?);
            Ok(())
        }
        Command::Log { upid, follow: true } => {
            let task = client.attach(&upid)?;
            follow(&task).await
        }
        Command::Log { upid, follow: false } => {
            let task = client.attach(&upid)?;
            for line in task.log().await {
                println!("{}", line);
            }
            Ok(())
        }
        Command::Wait { upid } => {
            let task = client.attach(&upid)?;
            let result = task.wait_for_completion().await;
            if let Some(exit_status) = task.exit_status().await {
                println!("{}", exit_status);
            }
            result.with_context(|| format!("Task {} failed", upid))
        }
        Command::Cancel { upid } => {
            let task = client.attach(&upid)?;
            task.cancel()
                .await
                .with_context(|| format!("Failed to stop task {}", upid))?;
            info!(upid = %upid, "Task stopped");
            Ok(())
        }
    }
}

/// Print log lines as they arrive until the task is done.
///
/// Ctrl-C stops the task on the server before returning.
async fn follow(task: &dyn Task) -> Result<()> {
    let mut lines = task.log_stream();

    loop {
        tokio::select! {
            item = lines.next() => match item {
                Some(Ok(line)) => println!("{}", line),
                Some(Err(e)) => return Err(e).context("Task failed"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!(upid = %task.id(), "Interrupted, stopping task");
                task.cancel().await.context("Failed to stop task")?;
                anyhow::bail!("Interrupted");
            }
        }
    }

    task.wait_for_completion().await.context("Task failed")
}
