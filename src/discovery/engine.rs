use std::sync::Arc;

use crate::{
    assembly::MethodRef,
    config::ScanConfig,
    discovery::{CandidateRole, MethodCandidate, ModuleSource, ScanPass, ScanSummary},
    inspect::{BodyInspector, BodySource},
    metadata::descriptor::{MethodDescriptor, ModuleDescriptor},
    patch::{Installer, PatchEngine},
    runtime::{Level, LogSink},
    Result,
};

/// Name suffix of outbound remote methods
pub const OUTBOUND_SUFFIX: &str = "ServerRpc";

/// Name prefix of generated inbound dispatch handlers
pub const INBOUND_PREFIX: &str = "__rpc_handler_";

/// Parameter shape of generated inbound dispatch handlers
pub const INBOUND_SHAPE: [&str; 3] = ["NetworkBehaviour", "FastBufferReader", "__RpcParams"];

/// Attribute marking outbound remote methods
pub const RPC_ATTRIBUTE: &str = "ServerRpcAttribute";

/// Named argument of [`RPC_ATTRIBUTE`] that restricts the method to the owner
pub const REQUIRE_OWNERSHIP: &str = "RequireOwnership";

/// Finds interception candidates in the loaded modules and installs interceptions.
///
/// Each call to [`DiscoveryEngine::scan`] is an independent pass: modules are processed in
/// snapshot order, and inside a module every outbound candidate is handled before the
/// first inbound candidate. Failures are logged and skipped at the smallest granularity
/// (method, then type, then module); a scan always runs to completion.
pub struct DiscoveryEngine {
    source: Arc<dyn ModuleSource>,
    bodies: Arc<dyn BodySource>,
    inspector: BodyInspector,
    installer: Installer,
    sink: Arc<dyn LogSink>,
    config: ScanConfig,
}

impl DiscoveryEngine {
    /// Creates an engine.
    ///
    /// # Arguments
    /// * `source` - Reflection facility enumerating modules, types and methods
    /// * `bodies` - Re-reads method bodies for inspection
    /// * `engine` - Patching engine interceptions are installed through
    /// * `sink` - Destination of scan diagnostics and of installed guard reports
    /// * `config` - Scan settings
    /// * `reporter` - Member reference rewritten dispatch handlers call
    pub fn new(
        source: Arc<dyn ModuleSource>,
        bodies: Arc<dyn BodySource>,
        engine: Arc<dyn PatchEngine>,
        sink: Arc<dyn LogSink>,
        config: ScanConfig,
        reporter: MethodRef,
    ) -> Self {
        let installer = Installer::new(
            engine,
            bodies.clone(),
            sink.clone(),
            config.clone(),
            reporter,
        );

        DiscoveryEngine {
            source,
            bodies,
            inspector: BodyInspector::new(config.marker.clone()),
            installer,
            sink,
            config,
        }
    }

    /// The scan settings
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Classify `method` by name and parameter shape
    #[must_use]
    pub fn classify(method: &MethodDescriptor) -> Option<CandidateRole> {
        if method.name.ends_with(OUTBOUND_SUFFIX) {
            return Some(CandidateRole::OutboundCall);
        }

        let shape_matches = method.parameters.len() == INBOUND_SHAPE.len()
            && method
                .parameters
                .iter()
                .zip(INBOUND_SHAPE)
                .all(|(parameter, expected)| simple_name(parameter) == expected);

        if method.name.starts_with(INBOUND_PREFIX) && shape_matches {
            Some(CandidateRole::InboundDispatch)
        } else {
            None
        }
    }

    /// Run one full scan pass over a snapshot of the loaded modules.
    pub fn scan(&self) -> ScanSummary {
        self.sink.info("Dynamic patching...");

        let modules = self.source.modules();
        let interval = self.config.progress_interval.max(1);
        let mut pass = ScanPass::new();
        pass.begin(modules.len());

        for module in &modules {
            if let Err(error) = self.scan_module(&mut pass, module) {
                self.sink
                    .error(&format!("Error scanning assembly {}: {error}", module.name));
            }

            pass.module_done();
            let processed = pass.modules_processed();
            if processed % interval == 0 || processed == modules.len() {
                self.sink.message(&format!(
                    "Patching progress: {processed}/{} assemblies processed, {} ServerRpc methods patched",
                    modules.len(),
                    pass.patched()
                ));
            }
        }

        self.sink.info(&format!(
            "Dynamic patching complete. Processed {} assemblies.",
            modules.len()
        ));
        pass.finish()
    }

    fn scan_module(&self, pass: &mut ScanPass, module: &ModuleDescriptor) -> Result<()> {
        self.trace(
            Level::Message,
            &format!("----Scanning assembly {} for patch methods----", module.name),
        );

        let listing = match self.source.types(module) {
            Ok(listing) => listing,
            Err(error) => {
                self.sink.warning(&format!(
                    "Error getting types from assembly {}: {error}",
                    module.name
                ));
                return Ok(());
            }
        };

        if listing.is_partial() {
            self.sink.warning(&format!(
                "Some types in assembly {} couldn't be loaded",
                module.name
            ));
            self.sink.warning(&format!(
                "Failed to load {} types from {} total types",
                listing.failed,
                listing.total()
            ));
        }

        let mut outbound = Vec::new();
        let mut inbound = Vec::new();
        for ty in &listing.types {
            let methods = match self.source.methods(ty) {
                Ok(methods) => methods,
                Err(error) => {
                    self.sink.error(&format!(
                        "Error accessing methods for type {}: {error}",
                        ty.name
                    ));
                    continue;
                }
            };

            for method in methods {
                match Self::classify(&method) {
                    Some(CandidateRole::OutboundCall) => outbound
                        .push(MethodCandidate::new(method, CandidateRole::OutboundCall)),
                    Some(CandidateRole::InboundDispatch) => inbound
                        .push(MethodCandidate::new(method, CandidateRole::InboundDispatch)),
                    None => {}
                }
            }
        }

        for candidate in outbound.iter().chain(&inbound) {
            let result = match candidate.role {
                CandidateRole::OutboundCall => self.handle_outbound(pass, &candidate.method),
                CandidateRole::InboundDispatch => self.handle_inbound(pass, &candidate.method),
            };

            if let Err(error) = result {
                self.sink.error(&format!(
                    "Error processing patch method {}: {error}",
                    candidate.method.name
                ));
            }
        }

        Ok(())
    }

    fn handle_outbound(&self, pass: &mut ScanPass, method: &MethodDescriptor) -> Result<()> {
        let signature = method.signature();
        if pass.contains(&signature) {
            self.trace(
                Level::Warning,
                &format!("Already patched {signature}, skipping"),
            );
            return Ok(());
        }

        let attributes = self.source.attributes(method)?;
        let Some(attribute) = attributes.iter().find(|attr| attr.is(RPC_ATTRIBUTE)) else {
            self.trace(
                Level::Warning,
                &format!(
                    "No {RPC_ATTRIBUTE} found for {signature} despite ending with '{OUTBOUND_SUFFIX}', skipping"
                ),
            );
            return Ok(());
        };

        if !attribute.named_bool(REQUIRE_OWNERSHIP).unwrap_or(true) {
            self.trace(
                Level::Info,
                &format!(
                    "{RPC_ATTRIBUTE} found for {signature} but {REQUIRE_OWNERSHIP} is false, skipping"
                ),
            );
            return Ok(());
        }

        self.install(pass, &signature, |pass| {
            self.installer.install_pre_call_guard(pass, method)
        });
        Ok(())
    }

    fn handle_inbound(&self, pass: &mut ScanPass, method: &MethodDescriptor) -> Result<()> {
        let signature = method.signature();
        if pass.contains(&signature) {
            self.trace(
                Level::Warning,
                &format!("Already patched {signature}, skipping"),
            );
            return Ok(());
        }

        if !self.inspector.contains_marker(self.bodies.as_ref(), method) {
            self.sink
                .debug(&format!("No ownership marker in {signature}, skipping"));
            return Ok(());
        }

        self.install(pass, &signature, |pass| {
            self.installer.install_body_rewrite(pass, method)
        });
        Ok(())
    }

    fn install<F>(&self, pass: &mut ScanPass, signature: &str, install: F)
    where
        F: FnOnce(&mut ScanPass) -> Result<bool>,
    {
        match install(pass) {
            Ok(true) => self.trace(Level::Info, &format!("Successfully patched {signature}")),
            Ok(false) => {}
            Err(error) => {
                pass.record_failure();
                self.sink
                    .error(&format!("Failed to patch {signature}: {error}"));
            }
        }
    }

    fn trace(&self, level: Level, message: &str) {
        if self.config.log_assembly_scanning {
            self.sink.log(level, message);
        }
    }
}

fn simple_name(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(_, simple)| simple)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        discovery::InMemorySource,
        metadata::{
            descriptor::{CustomAttribute, CustomAttributeArgument, TypeDescriptor},
            method::MethodIl,
            token::Token,
        },
        patch::HookRegistry,
        runtime::{InboundViolationReporter, MemorySink},
    };

    struct NoBodies;

    impl BodySource for NoBodies {
        fn read_body(&self, _method: &MethodDescriptor) -> Result<Option<MethodIl>> {
            Ok(None)
        }
    }

    fn rpc() -> CustomAttribute {
        CustomAttribute::new("Unity.Netcode.ServerRpcAttribute")
    }

    fn engine(
        source: InMemorySource,
        config: ScanConfig,
    ) -> (Arc<MemorySink>, Arc<HookRegistry>, DiscoveryEngine) {
        let sink = Arc::new(MemorySink::new());
        let registry = Arc::new(HookRegistry::new("ownerscope", sink.clone()));
        let engine = DiscoveryEngine::new(
            Arc::new(source),
            Arc::new(NoBodies),
            registry.clone(),
            sink.clone(),
            config,
            InboundViolationReporter::method_ref(Token::new(0x0A00_0042)),
        );
        (sink, registry, engine)
    }

    #[test]
    fn test_classification() {
        let outbound = MethodDescriptor::new("Game", "Foo", "DoThingServerRpc");
        let handler = MethodDescriptor::new("Game", "Foo", "__rpc_handler_12345")
            .with_parameters([
                "Unity.Netcode.NetworkBehaviour",
                "FastBufferReader",
                "__RpcParams",
            ]);
        let wrong_shape =
            MethodDescriptor::new("Game", "Foo", "__rpc_handler_1").with_parameters(["Int32"]);
        let other = MethodDescriptor::new("Game", "Foo", "Update");

        assert_eq!(
            DiscoveryEngine::classify(&outbound),
            Some(CandidateRole::OutboundCall)
        );
        assert_eq!(
            DiscoveryEngine::classify(&handler),
            Some(CandidateRole::InboundDispatch)
        );
        assert_eq!(DiscoveryEngine::classify(&wrong_shape), None);
        assert_eq!(DiscoveryEngine::classify(&other), None);
    }

    #[test]
    fn test_attribute_filtering() {
        let ty = TypeDescriptor::new("Game", "", "Foo");
        let source = InMemorySource::new()
            .with_method(
                ty.clone(),
                MethodDescriptor::new("Game", "Foo", "GuardedServerRpc"),
                [rpc()],
            )
            .with_method(
                ty.clone(),
                MethodDescriptor::new("Game", "Foo", "OpenServerRpc"),
                [rpc().with_field(REQUIRE_OWNERSHIP, CustomAttributeArgument::Bool(false))],
            )
            .with_method(
                ty,
                MethodDescriptor::new("Game", "Foo", "PlainServerRpc"),
                [],
            );

        let (sink, registry, engine) = engine(source, ScanConfig::verbose());
        let summary = engine.scan();

        assert_eq!(summary.outbound, 1);
        assert_eq!(registry.prefix_count(), 1);
        assert!(sink.contains(Level::Info, "Successfully patched Foo.GuardedServerRpc()"));
        assert!(sink.contains(Level::Info, "Foo.OpenServerRpc() but RequireOwnership is false"));
        assert!(sink.contains(
            Level::Warning,
            "No ServerRpcAttribute found for Foo.PlainServerRpc()"
        ));
        assert!(sink.contains(Level::Message, "----Scanning assembly Game for patch methods----"));
    }

    #[test]
    fn test_quiet_without_verbose_logging() {
        let source = InMemorySource::new().with_method(
            TypeDescriptor::new("Game", "", "Foo"),
            MethodDescriptor::new("Game", "Foo", "PlainServerRpc"),
            [],
        );

        let (sink, _, engine) = engine(source, ScanConfig::default());
        engine.scan();

        assert_eq!(sink.count_level(Level::Warning), 0);
        assert!(sink.contains(Level::Info, "Dynamic patching complete. Processed 1 assemblies."));
    }

    #[test]
    fn test_duplicate_signature_is_patched_once() {
        let source = InMemorySource::new()
            .with_method(
                TypeDescriptor::new("GameA", "", "Foo"),
                MethodDescriptor::new("GameA", "Foo", "DoThingServerRpc"),
                [rpc()],
            )
            .with_method(
                TypeDescriptor::new("GameB", "", "Foo"),
                MethodDescriptor::new("GameB", "Foo", "DoThingServerRpc"),
                [rpc()],
            );

        let (sink, _, engine) = engine(source, ScanConfig::verbose());
        let summary = engine.scan();

        assert_eq!(summary.outbound, 1);
        assert!(sink.contains(Level::Warning, "Already patched Foo.DoThingServerRpc(), skipping"));
    }

    #[test]
    fn test_failures_are_contained() {
        let source = InMemorySource::new()
            .with_unreadable_module("Dynamic", "The invoked member is not supported")
            .with_failed_types("Game", 2)
            .with_broken_type(TypeDescriptor::new("Game", "", "Broken"))
            .with_method(
                TypeDescriptor::new("Game", "", "Foo"),
                MethodDescriptor::new("Game", "Foo", "DoThingServerRpc"),
                [rpc()],
            );

        let (sink, registry, engine) = engine(source, ScanConfig::default());
        registry
            .mark_foreign(
                &MethodDescriptor::new("Game", "Foo", "DoThingServerRpc"),
                "OtherPlugin",
            )
            .unwrap();
        let summary = engine.scan();

        assert_eq!(summary.modules, 2);
        assert_eq!(summary.outbound, 0);
        assert_eq!(summary.failures, 1);
        assert!(sink.contains(Level::Warning, "Error getting types from assembly Dynamic"));
        assert!(sink.contains(Level::Warning, "Some types in assembly Game couldn't be loaded"));
        assert!(sink.contains(Level::Warning, "Failed to load 2 types from 4 total types"));
        assert!(sink.contains(Level::Error, "Error accessing methods for type Broken"));
        assert!(sink.contains(Level::Error, "Failed to patch Foo.DoThingServerRpc()"));
    }

    #[test]
    fn test_progress_every_interval() {
        let mut source = InMemorySource::new();
        for i in 0..7 {
            source = source.with_module(ModuleDescriptor::new(format!("Module{i}")));
        }

        let (sink, _, engine) = engine(source, ScanConfig::default());
        engine.scan();

        let progress = sink
            .at_level(Level::Message)
            .into_iter()
            .map(|record| record.message.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            progress,
            [
                "Patching progress: 5/7 assemblies processed, 0 ServerRpc methods patched",
                "Patching progress: 7/7 assemblies processed, 0 ServerRpc methods patched",
            ]
        );
    }

    #[test]
    fn test_progress_with_zero_interval() {
        let source = InMemorySource::new()
            .with_module(ModuleDescriptor::new("Module0"))
            .with_module(ModuleDescriptor::new("Module1"));
        let config = ScanConfig {
            progress_interval: 0,
            ..ScanConfig::default()
        };

        let (sink, _, engine) = engine(source, config);
        let summary = engine.scan();

        assert_eq!(summary.modules, 2);
        assert_eq!(sink.count_level(Level::Fatal), 0);
        assert!(sink.contains(
            Level::Message,
            "Patching progress: 1/2 assemblies processed, 0 ServerRpc methods patched"
        ));
        assert!(sink.contains(
            Level::Message,
            "Patching progress: 2/2 assemblies processed, 0 ServerRpc methods patched"
        ));
    }
}
