// crates/sentinel-server/src/lib.rs
// ============================================================================
// Module: Sentinel Server Library
// Description: Public API surface of the Sentinel compliance engine daemon.
// Purpose: Wire every other Sentinel crate's ports together behind one
// explicit dependency container and a scheduler loop.
// Dependencies: every other crate in this workspace
// ============================================================================

//! ## Overview
//! `sentinel-server` is the binary boundary of the compliance engine: it owns
//! no domain logic of its own, only the concrete adapters (a cloud resource
//! provider, a job dispatcher, an authorizer, a license/event wiring layer)
//! that every other crate's ports require, plus the scheduler loop that
//! drives their periodic operations. [`container::Container`] is the single
//! place that constructs and holds them; nothing here reaches for a global or
//! a singleton.

pub mod authorizer;
pub mod calendar;
pub mod container;
pub mod dispatch;
pub mod events;
pub mod health;
pub mod ids;
pub mod licensing;
pub mod provider;
pub mod scheduler;
pub mod tenant_groups;

pub use authorizer::StoreBackedAuthorizer;
pub use authorizer::TenantCache;
pub use container::Container;
pub use container::ContainerError;
pub use dispatch::WorkerJobDispatcher;
pub use events::EventJobSubmitter;
pub use events::MirroredLicenseFilter;
pub use health::FatalConditionCheck;
pub use licensing::JobSubmissionService;
pub use licensing::LicenseKeyRegistry;
pub use provider::InventoryResourceProvider;
pub use provider::InventoryProviderError;
pub use scheduler::SchedulerTicks;
pub use tenant_groups::TenantGroupMap;
