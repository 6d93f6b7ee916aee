// Archivo: domain.rs
// Propósito: tipos de dominio de los recursos versionados (`Step`, `Action`)
// y del flujo de cambios (`ChangeEvent`). La forma JSON sigue la del
// almacenamiento: `metadata` + `spec`, con claves en camelCase.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Kind de los recursos `Step`.
pub const STEP_KIND: &str = "Step";
/// Kind de los recursos `Action`.
pub const ACTION_KIND: &str = "Action";

/// Claves reservadas que el invocador inyecta en cada llamada saliente.
pub const FLOW_ID_KEY: &str = "flowID";
pub const STEP_NAME_KEY: &str = "stepName";
pub const ACK_STATE_KEY: &str = "ackState";
pub const UUID_KEY: &str = "uuid";
pub const RESERVED_PARAM_KEYS: [&str; 4] = [FLOW_ID_KEY, STEP_NAME_KEY, ACK_STATE_KEY, UUID_KEY];

/// Mapa ordenado de parámetros de invocación (nombre -> valor).
pub type ParamMap = BTreeMap<String, JsonValue>;

/// Metadatos comunes a todo recurso persistido.
///
/// `resource_version` lo asigna el almacenamiento en cada mutación y es
/// estrictamente creciente.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uuid: Uuid,
    #[serde(default)]
    pub resource_version: i64,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl Metadata {
    /// Identidad estable `namespace/name` del recurso.
    pub fn identity(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Unidad de trabajo que pertenece a un flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub metadata: Metadata,
    pub spec: StepSpec,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    #[serde(rename = "flowID", default)]
    pub flow_id: String,
    pub action_name: String,
    #[serde(default)]
    pub action_params: ParamMap,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub retry_count: u32,
}

impl Step {
    /// Construye un step listo para escribirse en el almacenamiento. El
    /// `resource_version` y el `uuid` los completa el store.
    pub fn new(name: &str, flow_id: &str, action_name: &str, action_params: ParamMap) -> Self {
        Self { metadata: Metadata { name: name.to_string(),
                                    kind: STEP_KIND.to_string(),
                                    ..Default::default() },
               spec: StepSpec { flow_id: flow_id.to_string(),
                                action_name: action_name.to_string(),
                                action_params,
                                done: false,
                                retry_count: 0 } }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn is_done(&self) -> bool {
        self.spec.done
    }
}

/// Tipo de transporte con el que se sirve una acción.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServeType {
    #[serde(rename = "HTTP", alias = "http")]
    Http,
    #[serde(rename = "GRPC", alias = "grpc")]
    Grpc,
}

impl fmt::Display for ServeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServeType::Http => write!(f, "HTTP"),
            ServeType::Grpc => write!(f, "GRPC"),
        }
    }
}

/// Tipo declarado de un parámetro de acción.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    /// Acepta cualquier valor JSON no nulo.
    Any,
}

impl ParamType {
    /// Indica si `value` es aceptable para este tipo declarado.
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            ParamType::Str => value.is_string(),
            ParamType::Int => value.is_i64() || value.is_u64(),
            ParamType::Float => value.is_number(),
            ParamType::Bool => value.is_boolean(),
            ParamType::Any => !value.is_null(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Str => "str",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::Any => "any",
        }
    }
}

/// Plantilla de invocación reutilizable referenciada por los steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub metadata: Metadata,
    pub spec: ActionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    /// Esquema declarado: cada parámetro listado es obligatorio.
    #[serde(default)]
    pub params: BTreeMap<String, ParamType>,
    pub serve_type: ServeType,
    #[serde(alias = "endpoints")]
    pub endpoint: String,
    #[serde(default)]
    pub return_states: Vec<String>,
}

impl Action {
    pub fn new(name: &str, serve_type: ServeType, endpoint: &str) -> Self {
        Self { metadata: Metadata { name: name.to_string(),
                                    kind: ACTION_KIND.to_string(),
                                    ..Default::default() },
               spec: ActionSpec { params: BTreeMap::new(),
                                  serve_type,
                                  endpoint: endpoint.to_string(),
                                  return_states: Vec::new() } }
    }

    /// Builder: declara un parámetro obligatorio.
    pub fn with_param(mut self, name: &str, ty: ParamType) -> Self {
        self.spec.params.insert(name.to_string(), ty);
        self
    }

    /// Builder: fija los estados de acuse que el endpoint puede reportar.
    pub fn with_return_states(mut self, states: &[&str]) -> Self {
        self.spec.return_states = states.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Valor de `ackState`: los estados de retorno unidos por comas.
    pub fn ack_state(&self) -> String {
        self.spec.return_states.join(",")
    }
}

/// Evento de cambio entregado por una suscripción `watch`.
///
/// `object` es el documento crudo tal como lo guarda el store; el consumidor
/// decide cómo deserializarlo.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub object: JsonValue,
    pub version: i64,
}

impl ChangeEvent {
    /// Nombre del recurso del evento, vacío si el payload no lo trae.
    pub fn name(&self) -> &str {
        self.object
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("")
    }
}

/// Lee `metadata.resourceVersion` de un documento crudo.
pub fn resource_version_of(object: &JsonValue) -> Option<i64> {
    object.get("metadata")
          .and_then(|m| m.get("resourceVersion"))
          .and_then(|v| v.as_i64())
}

/// Filtro de `list`: igualdad sobre campos de `spec`. Vacío = todo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    fields: BTreeMap<String, JsonValue>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: JsonValue) -> Self {
        self.fields.insert(field.to_string(), value);
        self
    }

    pub fn matches(&self, object: &JsonValue) -> bool {
        let spec = object.get("spec");
        self.fields
            .iter()
            .all(|(k, v)| spec.and_then(|s| s.get(k)) == Some(v))
    }
}
