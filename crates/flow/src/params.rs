// Archivo: params.rs
// Propósito: validar los parámetros de un step contra el esquema de su
// acción e inyectar las claves reservadas del sistema.
use crate::domain::{Action, ParamMap, ParamType, Step, ACK_STATE_KEY, FLOW_ID_KEY, RESERVED_PARAM_KEYS,
                    STEP_NAME_KEY, UUID_KEY};
use crate::errors::ParameterValidationError;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Comprueba `params` contra el esquema `declared`.
///
/// Todo parámetro declarado es obligatorio y debe tener el tipo indicado.
/// Los parámetros extra del step se aceptan tal cual. El esquema no puede
/// declarar ninguna de las claves reservadas.
pub fn check_action_params(params: &ParamMap,
                           declared: &BTreeMap<String, ParamType>)
                           -> Result<(), ParameterValidationError> {
    for (name, ty) in declared {
        if RESERVED_PARAM_KEYS.contains(&name.as_str()) {
            return Err(ParameterValidationError::ReservedKey { name: name.clone() });
        }
        let value = params.get(name)
                          .filter(|v| !v.is_null())
                          .ok_or_else(|| ParameterValidationError::Missing { name: name.clone() })?;
        if !ty.accepts(value) {
            return Err(ParameterValidationError::TypeMismatch { name: name.clone(),
                                                                expected: ty.as_str().to_string(),
                                                                found: json_type_name(value).to_string() });
        }
    }
    Ok(())
}

/// Devuelve los parámetros de invocación del step con las cuatro claves
/// reservadas inyectadas. No modifica el step: el resultado depende sólo del
/// step y de la acción, así que reintentos sucesivos producen los mismos
/// valores reservados. Un valor de usuario con una clave reservada se
/// sobrescribe.
pub fn enrich_params(step: &Step, action: &Action) -> ParamMap {
    let mut params = step.spec.action_params.clone();
    params.insert(FLOW_ID_KEY.to_string(), JsonValue::String(step.spec.flow_id.clone()));
    params.insert(STEP_NAME_KEY.to_string(), JsonValue::String(step.metadata.name.clone()));
    params.insert(ACK_STATE_KEY.to_string(), JsonValue::String(action.ack_state()));
    params.insert(UUID_KEY.to_string(), JsonValue::String(step.metadata.uuid.to_string()));
    params
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(n) if n.is_f64() => "float",
        JsonValue::Number(_) => "int",
        JsonValue::String(_) => "str",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
