//! Crate `flow`: recursos versionados y contrato de almacenamiento
//!
//! Este crate define los recursos que maneja el controlador (`Step`,
//! `Action`), el contrato de almacenamiento `ResourceStore` con su
//! suscripción de cambios `WatchStream`, la validación de parámetros contra
//! el esquema de una acción y una implementación en memoria útil para
//! pruebas (`InMemoryResourceStore`).
//!
//! Diseño resumido:
//! - Cada mutación recibe un `resourceVersion` estrictamente creciente.
//! - `watch(since)` nunca repite versiones `<= since` y respeta el orden.
//! - Los documentos viajan crudos (`serde_json::Value`); el consumidor
//!   deserializa y decide qué hacer con un payload corrupto.
//!
//! Ejemplo rápido:
//! ```rust
//! use flow::stubs::InMemoryResourceStore;
//! use flow::{Action, ServeType};
//! let store = InMemoryResourceStore::new();
//! let action = Action::new("notify", ServeType::Http, "http://127.0.0.1:9000/notify");
//! let saved = store.put_action("echoer", &action).unwrap();
//! assert_eq!(saved.metadata.resource_version, 1);
//! ```
pub mod domain;
pub mod errors;
pub mod params;
pub mod repository;
pub mod stubs;

pub use domain::*;
pub use errors::*;
pub use params::*;
pub use repository::*;
pub use stubs::*;
