//! Ownership state of networked objects and the authorization verdict.
//!
//! A networked object has exactly one owning client. Remote methods that require ownership
//! may only be invoked by that owner; the server executing the call is always allowed to
//! proceed. The verdict is computed fresh for every intercepted call from the live object,
//! since ownership can change at any time.

use strum::{Display, EnumIter};

use crate::{Error, Result};

/// Execution stage of a remote procedure call as tracked by the networking layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum RpcExecStage {
    /// The call is being initiated locally
    None,
    /// The call is executing on the server
    Server,
    /// The call is executing on a client
    Client,
}

impl RpcExecStage {
    /// Converts the raw stage value used by the networking layer
    #[must_use]
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(RpcExecStage::None),
            1 => Some(RpcExecStage::Server),
            2 => Some(RpcExecStage::Client),
            _ => None,
        }
    }

    /// True if the call executes with server authority
    #[must_use]
    pub fn is_authoritative(&self) -> bool {
        *self == RpcExecStage::Server
    }
}

/// The session-wide network manager of the host process.
pub trait NetworkManager: Send + Sync {
    /// Client id of this process
    fn local_client_id(&self) -> u64;

    /// True if this process acts as a client (hosts are clients too)
    fn is_client(&self) -> bool;

    /// True if this process acts as host (server and client at once)
    fn is_host(&self) -> bool;

    /// True if this process acts as a server
    fn is_server(&self) -> bool;

    /// True while a network session is running
    fn is_listening(&self) -> bool;
}

/// A networked object whose remote methods are intercepted.
pub trait NetworkBehaviour: Send + Sync {
    /// Client id of the owner
    fn owner_client_id(&self) -> u64;

    /// Stage of the remote call currently executing on this object
    fn exec_stage(&self) -> RpcExecStage;

    /// Name of the game object the behaviour is attached to
    fn object_name(&self) -> String;

    /// Namespace-qualified type name of the behaviour
    fn type_name(&self) -> String;

    /// The manager this object is registered with, if any
    fn network_manager(&self) -> Option<&dyn NetworkManager>;
}

/// Role of the local process in the network session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Role {
    /// Server and client at once
    Host,
    /// Dedicated server
    Server,
    /// Remote client
    Client,
    /// No session role
    Offline,
}

impl Role {
    /// Role of the process `manager` belongs to
    #[must_use]
    pub fn of(manager: &dyn NetworkManager) -> Role {
        if manager.is_host() {
            Role::Host
        } else if manager.is_server() {
            Role::Server
        } else if manager.is_client() {
            Role::Client
        } else {
            Role::Offline
        }
    }
}

/// Outcome of an ownership check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No network session is running; ownership does not apply
    NotApplicable,
    /// The call is allowed
    Authorized,
    /// A non-owner invoked a method that requires ownership
    Denied,
}

impl Verdict {
    /// True for [`Verdict::Denied`]
    #[must_use]
    pub fn is_denied(&self) -> bool {
        *self == Verdict::Denied
    }
}

/// Ownership facts about one intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipContext {
    /// Client id of the object's owner
    pub owner_id: u64,
    /// Client id of this process
    pub local_id: u64,
    /// True if the call executes with server authority
    pub is_authoritative: bool,
    /// True while a network session is running
    pub is_listening: bool,
    /// True if this process takes part in the session as client or host
    pub is_participant: bool,
    /// Role of this process
    pub role: Role,
}

impl OwnershipContext {
    /// Read the ownership facts from a live object.
    ///
    /// # Errors
    /// Returns [`Error::MissingNetworkManager`] if the object is not registered with a
    /// manager.
    pub fn capture(behaviour: &dyn NetworkBehaviour) -> Result<Self> {
        let Some(manager) = behaviour.network_manager() else {
            return Err(Error::MissingNetworkManager(behaviour.object_name()));
        };

        Ok(OwnershipContext {
            owner_id: behaviour.owner_client_id(),
            local_id: manager.local_client_id(),
            is_authoritative: behaviour.exec_stage().is_authoritative(),
            is_listening: manager.is_listening(),
            is_participant: manager.is_client() || manager.is_host(),
            role: Role::of(manager),
        })
    }

    /// Evaluate the ownership rule
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if !self.is_listening {
            return Verdict::NotApplicable;
        }

        if !self.is_authoritative && self.is_participant && self.local_id != self.owner_id {
            Verdict::Denied
        } else {
            Verdict::Authorized
        }
    }
}

/// True unless a non-owner participant invokes an ownership-restricted method outside
/// server authority.
///
/// A listening process is treated as a session participant.
#[must_use]
pub fn authorized(owner_id: u64, local_id: u64, is_authoritative: bool, is_listening: bool) -> bool {
    let context = OwnershipContext {
        owner_id,
        local_id,
        is_authoritative,
        is_listening,
        is_participant: is_listening,
        role: if is_listening {
            Role::Client
        } else {
            Role::Offline
        },
    };

    !context.verdict().is_denied()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Manager {
        local: u64,
        client: bool,
        host: bool,
        server: bool,
        listening: bool,
    }

    impl NetworkManager for Manager {
        fn local_client_id(&self) -> u64 {
            self.local
        }
        fn is_client(&self) -> bool {
            self.client
        }
        fn is_host(&self) -> bool {
            self.host
        }
        fn is_server(&self) -> bool {
            self.server
        }
        fn is_listening(&self) -> bool {
            self.listening
        }
    }

    struct Behaviour {
        owner: u64,
        stage: RpcExecStage,
        manager: Option<Manager>,
    }

    impl NetworkBehaviour for Behaviour {
        fn owner_client_id(&self) -> u64 {
            self.owner
        }
        fn exec_stage(&self) -> RpcExecStage {
            self.stage
        }
        fn object_name(&self) -> String {
            "Crate(Clone)".to_string()
        }
        fn type_name(&self) -> String {
            "Game.Crate".to_string()
        }
        fn network_manager(&self) -> Option<&dyn NetworkManager> {
            self.manager.as_ref().map(|m| m as &dyn NetworkManager)
        }
    }

    fn client(local: u64) -> Manager {
        Manager {
            local,
            client: true,
            host: false,
            server: false,
            listening: true,
        }
    }

    #[test]
    fn test_truth_table() {
        assert!(authorized(5, 5, false, true));
        assert!(!authorized(5, 3, false, true));
        assert!(authorized(5, 3, true, true));
        assert!(authorized(5, 3, false, false));
    }

    #[test]
    fn test_capture_from_client() {
        let behaviour = Behaviour {
            owner: 5,
            stage: RpcExecStage::None,
            manager: Some(client(3)),
        };

        let context = OwnershipContext::capture(&behaviour).unwrap();
        assert_eq!(context.owner_id, 5);
        assert_eq!(context.local_id, 3);
        assert!(!context.is_authoritative);
        assert!(context.is_participant);
        assert_eq!(context.role, Role::Client);
        assert_eq!(context.verdict(), Verdict::Denied);
    }

    #[test]
    fn test_server_stage_is_authorized() {
        let behaviour = Behaviour {
            owner: 5,
            stage: RpcExecStage::Server,
            manager: Some(client(3)),
        };
        let context = OwnershipContext::capture(&behaviour).unwrap();
        assert_eq!(context.verdict(), Verdict::Authorized);
    }

    #[test]
    fn test_dedicated_server_is_not_a_participant() {
        let behaviour = Behaviour {
            owner: 5,
            stage: RpcExecStage::None,
            manager: Some(Manager {
                local: 0,
                client: false,
                host: false,
                server: true,
                listening: true,
            }),
        };
        let context = OwnershipContext::capture(&behaviour).unwrap();
        assert_eq!(context.role, Role::Server);
        assert_eq!(context.verdict(), Verdict::Authorized);
    }

    #[test]
    fn test_not_listening() {
        let mut manager = client(3);
        manager.listening = false;
        let behaviour = Behaviour {
            owner: 5,
            stage: RpcExecStage::None,
            manager: Some(manager),
        };
        let context = OwnershipContext::capture(&behaviour).unwrap();
        assert_eq!(context.verdict(), Verdict::NotApplicable);
    }

    #[test]
    fn test_missing_manager() {
        let behaviour = Behaviour {
            owner: 5,
            stage: RpcExecStage::None,
            manager: None,
        };
        assert!(matches!(
            OwnershipContext::capture(&behaviour),
            Err(Error::MissingNetworkManager(name)) if name == "Crate(Clone)"
        ));
    }

    #[test]
    fn test_raw_stage() {
        assert_eq!(RpcExecStage::from_raw(1), Some(RpcExecStage::Server));
        assert_eq!(RpcExecStage::from_raw(2), Some(RpcExecStage::Client));
        assert_eq!(RpcExecStage::from_raw(7), None);
        assert_eq!(RpcExecStage::Server.to_string(), "Server");
    }
}
