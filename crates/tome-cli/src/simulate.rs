use crate::events::*;
use anyhow::{anyhow, bail};
use serde_json::json;
use std::time::{Duration, Instant};
use tome_protocol::{Flow, Secret, Session, SessionBuilder, SessionConfig};
use tome_transport::MemoryNetwork;

pub struct SimulateConfig {
    pub spokes: usize,
    pub secret: Option<String>,
    pub pings: u32,
    pub session: SessionConfig,
}

const ADMISSION_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub async fn run(config: SimulateConfig, start: Instant) -> anyhow::Result<()> {
    if config.spokes == 0 {
        bail!("need at least one spoke");
    }

    let network = MemoryNetwork::new();
    let secret = config
        .secret
        .map(Secret::from)
        .unwrap_or_else(Secret::random)
        .normalized();
    eprintln!("Simulating hub + {} spokes, secret {secret}", config.spokes);

    let hub = SessionBuilder::host()
        .secret(secret.clone())
        .config(config.session.clone())
        .spawn(&network)
        .await?;
    announce(&hub, &secret);

    let mut spokes = Vec::with_capacity(config.spokes);
    for _ in 0..config.spokes {
        let spoke = SessionBuilder::join()
            .secret(secret.clone())
            .config(config.session.clone())
            .subscribe("ping", |data, ctx| {
                if ctx.request_id().is_some() {
                    ctx.respond(data.clone());
                }
                Flow::Continue
            })
            .spawn(&network)
            .await?;
        announce(&spoke, &secret);
        spokes.push(spoke);
    }

    tokio::time::timeout(ADMISSION_TIMEOUT, wait_for_star(&hub, &spokes))
        .await
        .map_err(|_| anyhow!("spokes not admitted within {ADMISSION_TIMEOUT:?}"))??;
    tracing::info!(spokes = spokes.len(), "all spokes admitted");
    emit(&EventAdmitted {
        event: "admitted",
        spokes: spokes.len(),
        elapsed_s: start.elapsed().as_secs_f64(),
    });

    if let Some((pinger, targets)) = spokes.split_first() {
        for target in targets {
            ping(pinger, target, config.pings).await?;
        }
    }

    for session in std::iter::once(&hub).chain(&spokes) {
        report_members(session).await?;
    }

    for spoke in &spokes {
        spoke.quit().await?;
    }
    hub.quit().await?;

    emit(&EventFinished {
        event: "finished",
        sessions: spokes.len() + 1,
        elapsed_s: start.elapsed().as_secs_f64(),
    });
    Ok(())
}

fn announce(session: &Session, secret: &Secret) {
    emit(&EventStarted::new(
        session.local_id().as_str(),
        &session.role().to_string(),
        &secret.to_string(),
    ));
}

/// Every spoke knows the hub and every other spoke, and the hub knows all spokes.
async fn wait_for_star(hub: &Session, spokes: &[Session]) -> anyhow::Result<()> {
    loop {
        let mut ready = hub.members().await?.len() == spokes.len();
        for spoke in spokes {
            if !ready {
                break;
            }
            ready = spoke.hub_id().await?.is_some()
                && spoke.members().await?.len() == spokes.len() - 1;
        }
        if ready {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn ping(from: &Session, to: &Session, count: u32) -> anyhow::Result<()> {
    let mut rtts = Vec::with_capacity(count as usize);
    for seq in 1..=count {
        let payload = json!({ "seq": seq, "from": from.local_id() });
        let sent = Instant::now();
        let echo = from.request_to(to.local_id(), "ping", &payload).await?;
        let rtt_ms = sent.elapsed().as_secs_f64() * 1000.0;
        if echo != payload {
            bail!("ping #{seq} to {} echoed {echo}", to.local_id());
        }
        rtts.push(rtt_ms);
        emit(&EventPing {
            event: "ping",
            from: from.local_id().to_string(),
            to: to.local_id().to_string(),
            seq,
            rtt_ms,
        });
    }

    if let Some(summary) = EventPingSummary::from_rtts(to.local_id().as_str(), &rtts) {
        eprintln!(
            "  {} -> {}: {} pings, avg {:.3} ms",
            from.local_id(),
            to.local_id(),
            summary.count,
            summary.avg_ms
        );
        tracing::info!(
            from = %from.local_id(),
            to = %to.local_id(),
            count = summary.count,
            avg_ms = summary.avg_ms,
            "ping summary"
        );
        emit(&summary);
    }
    Ok(())
}

async fn report_members(session: &Session) -> anyhow::Result<()> {
    let hub = session.hub_id().await?;
    let members = session.members().await?;
    eprintln!(
        "  {} ({}) knows {} members",
        session.local_id(),
        session.role(),
        members.len()
    );
    emit(&EventMembers {
        event: "members",
        id: session.local_id().to_string(),
        role: session.role().to_string(),
        hub: hub.map(|h| h.to_string()),
        members: members.iter().map(|m| m.to_string()).collect(),
    });
    Ok(())
}
