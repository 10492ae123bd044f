use std::{collections::HashSet, fmt};

use strum::{Display, EnumIter};

use crate::metadata::descriptor::MethodDescriptor;

/// Why a method was picked up by the scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum CandidateRole {
    /// A remote method invoked by clients; gets a pre-call guard
    OutboundCall,
    /// A generated server-side dispatch handler; gets a body rewrite
    InboundDispatch,
}

/// A method considered for interception during one scan pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCandidate {
    /// Identity of the method
    pub method: MethodDescriptor,
    /// Kind of interception it qualifies for
    pub role: CandidateRole,
}

impl MethodCandidate {
    /// Creates a candidate
    #[must_use]
    pub fn new(method: MethodDescriptor, role: CandidateRole) -> Self {
        MethodCandidate { method, role }
    }

    /// Normalized signature of the method
    #[must_use]
    pub fn signature(&self) -> String {
        self.method.signature()
    }
}

/// State of one scan pass: the signatures patched so far and the running counters.
///
/// A fresh pass starts empty; nothing carries over between passes.
#[derive(Debug, Default)]
pub struct ScanPass {
    seen: HashSet<String>,
    modules_total: usize,
    modules_processed: usize,
    outbound: usize,
    inbound: usize,
    failures: usize,
}

impl ScanPass {
    /// Creates an empty pass
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of modules in the snapshot being scanned
    pub fn begin(&mut self, modules_total: usize) {
        self.modules_total = modules_total;
    }

    /// True if `signature` was patched during this pass
    #[must_use]
    pub fn contains(&self, signature: &str) -> bool {
        self.seen.contains(signature)
    }

    /// Record a successful patch; returns `false` if the signature was already recorded
    pub fn record(&mut self, signature: String, role: CandidateRole) -> bool {
        if !self.seen.insert(signature) {
            return false;
        }

        match role {
            CandidateRole::OutboundCall => self.outbound += 1,
            CandidateRole::InboundDispatch => self.inbound += 1,
        }
        true
    }

    /// Record a method that could not be patched
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Mark one module as processed
    pub fn module_done(&mut self) {
        self.modules_processed += 1;
    }

    /// Number of modules in the snapshot
    #[must_use]
    pub fn modules_total(&self) -> usize {
        self.modules_total
    }

    /// Number of modules processed so far
    #[must_use]
    pub fn modules_processed(&self) -> usize {
        self.modules_processed
    }

    /// Outbound guards installed so far
    #[must_use]
    pub fn outbound(&self) -> usize {
        self.outbound
    }

    /// Inbound rewrites installed so far
    #[must_use]
    pub fn inbound(&self) -> usize {
        self.inbound
    }

    /// All patches installed so far
    #[must_use]
    pub fn patched(&self) -> usize {
        self.outbound + self.inbound
    }

    /// Consume the pass into its summary
    #[must_use]
    pub fn finish(self) -> ScanSummary {
        ScanSummary {
            modules: self.modules_processed,
            outbound: self.outbound,
            inbound: self.inbound,
            failures: self.failures,
        }
    }
}

/// Counts reported at the end of a scan pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Modules processed
    pub modules: usize,
    /// Outbound guards installed
    pub outbound: usize,
    /// Inbound rewrites installed
    pub inbound: usize,
    /// Methods that failed to patch
    pub failures: usize,
}

impl ScanSummary {
    /// All patches installed
    #[must_use]
    pub fn patched(&self) -> usize {
        self.outbound + self.inbound
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} assemblies, {} ServerRpc methods guarded, {} dispatch handlers rewritten, {} failures",
            self.modules, self.outbound, self.inbound, self.failures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_once_per_signature() {
        let mut pass = ScanPass::new();
        pass.begin(2);

        assert!(pass.record("Foo.A()".to_string(), CandidateRole::OutboundCall));
        assert!(!pass.record("Foo.A()".to_string(), CandidateRole::OutboundCall));
        assert!(pass.record("Foo.__rpc_handler_1()".to_string(), CandidateRole::InboundDispatch));
        assert!(pass.contains("Foo.A()"));
        pass.record_failure();
        pass.module_done();

        assert_eq!(pass.patched(), 2);
        assert_eq!(pass.modules_total(), 2);

        let summary = pass.finish();
        assert_eq!(
            summary,
            ScanSummary {
                modules: 1,
                outbound: 1,
                inbound: 1,
                failures: 1,
            }
        );
        assert_eq!(summary.patched(), 2);
    }

    #[test]
    fn test_candidate_signature() {
        let candidate = MethodCandidate::new(
            MethodDescriptor::new("Game", "Foo", "DoThingServerRpc").with_parameters(["Int32"]),
            CandidateRole::OutboundCall,
        );
        assert_eq!(candidate.signature(), "Foo.DoThingServerRpc(Int32)");
        assert_eq!(candidate.role.to_string(), "OutboundCall");
    }
}
