use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const BANNER: &str = "vote relay listening on";

#[tokio::test]
async fn binary_serves_health_and_catalog() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin("vote-relay");

    let (mut relay, mut stdout) = spawn_relay(&binary).await?;
    let addr = read_relay_addr(&mut stdout).await?;

    // Drain further relay logs in the background so the pipe never fills.
    let log_task = tokio::spawn(async move {
        drain_stdout(stdout).await;
    });

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .context("health request")?
        .json()
        .await?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["clients"], 0);

    let polls: Value = reqwest::get(format!("http://{addr}/polls"))
        .await
        .context("polls request")?
        .json()
        .await?;
    let ids: Vec<&str> = polls
        .as_array()
        .context("polls should be an array")?
        .iter()
        .filter_map(|poll| poll["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["p1", "p2", "p3"]);

    let _ = relay.kill().await;
    let _ = relay.wait().await;
    let _ = log_task.await;

    Ok(())
}

async fn spawn_relay(binary: &Path) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("--bind")
        .arg("127.0.0.1")
        .arg("--port")
        .arg("0")
        .env_remove("STORE_GATEWAY_URL")
        .env_remove("POLL_CATALOG")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn vote relay")?;
    let stdout = child
        .stdout
        .take()
        .context("relay stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_relay_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    loop {
        let line = read_line(reader)
            .await?
            .context("relay exited before announcing its address")?;
        if !line.contains(BANNER) {
            continue;
        }

        let addr = line
            .trim()
            .split_whitespace()
            .last()
            .context("unexpected relay banner format")?;
        if !addr.contains(':') {
            return Err(anyhow!("relay banner missing socket: {line}"));
        }
        return Ok(addr.to_string());
    }
}

async fn read_line(reader: &mut BufReader<ChildStdout>) -> Result<Option<String>> {
    let mut line = String::new();
    let bytes = match timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(result) => result?,
        Err(_) => return Err(anyhow!("timed out waiting for line")),
    };
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while reader.read_line(&mut buffer).await.unwrap_or(0) > 0 {
        buffer.clear();
    }
}
