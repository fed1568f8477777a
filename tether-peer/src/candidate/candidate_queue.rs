use crate::error::SignalingError;
use crate::transport::TransportBinding;
use std::collections::{HashSet, VecDeque};
use tether_core::IceCandidate;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    /// Held until the remote description is applied.
    Queued,
    Applied,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: usize,
    pub rejected: usize,
}

/// Remote candidates of one session.
///
/// Candidates arriving before the remote description wait here in arrival
/// order; the queue is drained exactly once, right after that description is
/// applied. Afterwards candidates go straight to the transport.
#[derive(Debug, Default)]
pub struct CandidateQueue {
    pending: VecDeque<IceCandidate>,
    seen: HashSet<String>,
    drained: bool,
    applied: usize,
    rejected: usize,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `candidate` as seen. Returns false for a payload already
    /// admitted, so relay redeliveries are applied at most once.
    pub fn admit(&mut self, candidate: &IceCandidate) -> bool {
        self.seen.insert(candidate.payload.clone())
    }

    pub async fn enqueue_or_apply(
        &mut self,
        candidate: IceCandidate,
        remote_description_applied: bool,
        transport: &dyn TransportBinding,
    ) -> Result<CandidateDisposition, SignalingError> {
        if !remote_description_applied {
            self.pending.push_back(candidate);
            return Ok(CandidateDisposition::Queued);
        }

        match transport.add_ice_candidate(&candidate).await {
            Ok(()) => {
                self.applied += 1;
                Ok(CandidateDisposition::Applied)
            }
            Err(e) => {
                self.rejected += 1;
                Err(SignalingError::InvalidCandidate(format!("{:#}", e)))
            }
        }
    }

    /// Applies every queued candidate in arrival order. A rejected candidate
    /// is logged and skipped. Calling it again in the same round is a no-op.
    pub async fn drain(&mut self, transport: &dyn TransportBinding) -> DrainReport {
        let mut report = DrainReport::default();
        if self.drained {
            warn!("Candidate queue already drained for this round");
            return report;
        }
        self.drained = true;

        while let Some(candidate) = self.pending.pop_front() {
            match transport.add_ice_candidate(&candidate).await {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!("Skipping rejected ICE candidate: {:#}", e);
                    report.rejected += 1;
                }
            }
        }

        self.applied += report.applied;
        self.rejected += report.rejected;
        debug!(
            "Candidate queue drained: {} applied, {} rejected",
            report.applied, report.rejected
        );
        report
    }

    /// Drops everything still queued. Used on teardown.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }

    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }
}
