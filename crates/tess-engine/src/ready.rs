//! Pre-protocol readiness barrier.
//!
//! The underlying cryptographic library accepts round-1 traffic only after
//! every party has started, so no party may start until the whole group is
//! known to be listening. Each member announces itself on the session's
//! broadcast channel and waits until it has heard from every other member;
//! announcements repeat on an interval so a member that subscribed late
//! still converges. Expiry of the bound is a session failure and the party
//! machine is never started.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tess_core::{GroupInfo, MemberId, SessionId};
use tess_network::BroadcastChannel;
use tracing::{debug, warn};

pub(crate) const READY_TYPE: &str = "tess/ready";

/// Announcement that a member has opened its session channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReadyAnnouncement {
    session: SessionId,
    member: MemberId,
}

/// Announce readiness and wait for every other group member to do the same.
pub(crate) async fn await_group_ready(
    channel: &Arc<dyn BroadcastChannel>,
    group: &GroupInfo,
    session: &SessionId,
    timeout: Duration,
    announce_interval: Duration,
) -> Result<(), SessionError> {
    let mut pending: BTreeSet<MemberId> = group.other_members().cloned().collect();
    if pending.is_empty() {
        return Ok(());
    }

    let mut subscription = channel.recv(READY_TYPE);
    let announcement = bincode::serialize(&ReadyAnnouncement {
        session: session.clone(),
        member: group.this_member().clone(),
    })
    .map_err(|e| {
        SessionError::Protocol(tess_ecdsa::ProtocolError::round(
            "ready",
            format!("encode failed: {e}"),
        ))
    })?;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut announce = tokio::time::interval(announce_interval);

    loop {
        tokio::select! {
            _ = announce.tick() => {
                if let Err(e) = channel.send(READY_TYPE, announcement.clone()).await {
                    // Soft failure: the next tick retries.
                    warn!(error = %e, "failed to send ready announcement");
                }
            }
            incoming = subscription.next() => {
                let Some(incoming) = incoming else {
                    return Err(SessionError::Channels(tess_network::TransportError::Closed));
                };
                let ready: ReadyAnnouncement = match bincode::deserialize(&incoming.payload) {
                    Ok(ready) => ready,
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable ready announcement");
                        continue;
                    }
                };
                if ready.session != *session {
                    continue;
                }
                match incoming.sender.member_id() {
                    Ok(bound) if bound == ready.member => {}
                    _ => {
                        warn!(peer = %incoming.sender, "dropping ready with mismatched sender");
                        continue;
                    }
                }
                if pending.remove(&ready.member) {
                    debug!(member = %ready.member, remaining = pending.len(), "member ready");
                    if pending.is_empty() {
                        return Ok(());
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                return Err(SessionError::ReadyTimeout {
                    timeout,
                    missing: pending.len(),
                    absent: pending.into_iter().collect(),
                });
            }
        }
    }
}
