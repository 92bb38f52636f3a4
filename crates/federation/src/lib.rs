//! ActivityPub federation protocol engine.
//!
//! This crate covers the protocol side of federation:
//!
//! - **Objects**: Activity documents and the single-or-array union model
//! - **Targets**: One request builder per outbound action (notes, users,
//!   person fetches, well-known discovery)
//! - **Client**: Signed outbound HTTP calls with response classification
//! - **Directory**: Actor id to inbox / public key resolution
//! - **Verifier**: Inbound HTTP Signature validation with replay protection
//!
//! Signing primitives live in `apub_common::http_signature`; queueing and
//! dispatch live in `apub-queue`.

pub mod activities;
pub mod actors;
pub mod client;
pub mod directory;
pub mod objects;
pub mod targets;
pub mod verifier;

pub use activities::{Activity, ActivityType};
pub use actors::{ApEndpoints, ApPerson, ApPublicKey};
pub use client::{FederationClient, FederationClientError};
pub use directory::{ActorDirectory, ActorRecord, RemoteActorDirectory};
pub use objects::*;
pub use targets::{
    ACTIVITY_JSON, ActivityTarget, BuiltRequest, NoteDraft, NotesTarget, PersonTarget,
    SigningContext, TargetError, TargetType, UsersTarget, WellKnownTarget,
};
pub use verifier::{
    InboundRequest, ParsedSignature, SignatureValidator, ValidationError, VerifiedActor,
};
