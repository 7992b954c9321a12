//! Error taxonomy for hypervisor operations.
//!
//! Nothing here is retried internally: every failure carries the operation,
//! the target identity and the underlying libvirt message so the caller can
//! decide between retry and operator intervention.

use thiserror::Error;
use uuid::Uuid;

use crate::descriptor::DeviceKind;
use crate::vm::DomainState;

/// Convenience alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All failure modes surfaced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The endpoint could not be reached or refused the connection.
    #[error("failed to connect to {uri}: {message}")]
    Connection {
        /// Connection URI that was probed.
        uri: String,
        /// Underlying error text.
        message: String,
    },

    /// An operation was attempted through a closed connection handle.
    ///
    /// There is deliberately no implicit reconnect; the caller owns the
    /// endpoint lifecycle and must open a fresh handle.
    #[error("hypervisor endpoint is closed")]
    EndpointUnavailable,

    /// The hypervisor rejected a domain descriptor (name collision,
    /// malformed XML, address conflict).
    #[error("domain definition rejected for '{name}': {message}")]
    Definition {
        /// Domain name from the rejected descriptor.
        name: String,
        /// Raw hypervisor message.
        message: String,
    },

    /// Pool or volume creation failed.
    #[error("failed to create {resource}: {message}")]
    ResourceCreation {
        /// Name of the pool or volume that could not be created.
        resource: String,
        /// Raw hypervisor message.
        message: String,
    },

    /// A lifecycle transition was attempted from an incompatible state.
    #[error("cannot {operation} domain {uuid} while it is {state}")]
    InvalidState {
        /// The refused operation.
        operation: &'static str,
        /// Domain identity.
        uuid: Uuid,
        /// State the domain was actually in.
        state: DomainState,
    },

    /// More devices were requested than the fixed addressing scheme holds.
    ///
    /// This is a caller input error and is raised before any hypervisor
    /// round-trip.
    #[error("{requested} {kind} devices requested but only 4 target letters exist")]
    DeviceAddressExhausted {
        /// Device class that ran out of target letters.
        kind: DeviceKind,
        /// Number of devices the caller asked for.
        requested: usize,
    },

    /// An ISO upload stream failed. No partial-volume cleanup is automatic;
    /// the partially written volume is left for the caller to remove.
    #[error("upload of '{name}' failed: {message}")]
    Transfer {
        /// Volume name the stream was writing into.
        name: String,
        /// Underlying error text.
        message: String,
    },

    /// Lookup by name or UUID matched nothing on the endpoint.
    #[error("{kind} '{ident}' not found")]
    NotFound {
        /// What was looked up ("pool", "domain", "volume").
        kind: &'static str,
        /// The name or UUID that missed.
        ident: String,
    },

    /// A virsh round-trip failed for a reason outside the typed cases above.
    #[error("virsh {operation} failed for '{target}': {message}")]
    Operation {
        /// The virsh verb that failed.
        operation: &'static str,
        /// Pool, volume or domain the verb addressed.
        target: String,
        /// Raw stderr from virsh.
        message: String,
    },

    /// Descriptor text or virsh output that did not parse.
    #[error("failed to parse {what}: {message}")]
    Parse {
        /// What was being parsed.
        what: &'static str,
        /// Parser error text.
        message: String,
    },

    /// Subprocess or spool-file I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
