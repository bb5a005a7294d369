//! Node configuration rendering.
//!
//! The rendered configuration is a single opaque string handed to the
//! config builder init container, which expands it into config files.

use serde_json::{Map, Value, json};

use crate::controller::error::{Error, Result};
use crate::crd::DseDatacenter;
use crate::resources::common::seed_service_name;

/// Renders a datacenter's full node configuration.
pub trait ConfigRenderer {
    /// Render the configuration for every node of the datacenter.
    fn render(&self, resource: &DseDatacenter) -> Result<String>;
}

/// Renders the configuration as JSON.
///
/// The operator-owned model (cluster name, seeds, datacenter name) is
/// deep-merged with the user's `config` object. User values win.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonConfigRenderer;

impl ConfigRenderer for JsonConfigRenderer {
    fn render(&self, resource: &DseDatacenter) -> Result<String> {
        // Seeds resolve through the seed service, so the list never changes
        // when seed pods do.
        let mut model = Map::new();
        model.insert(
            "cluster-info".to_string(),
            json!({
                "name": resource.spec.dse_cluster_name,
                "seeds": seed_service_name(resource),
            }),
        );
        model.insert(
            "datacenter-info".to_string(),
            json!({ "name": resource.datacenter_name() }),
        );

        match &resource.spec.config {
            None | Some(Value::Null) => {}
            Some(Value::Object(user)) => merge_object(&mut model, user),
            Some(other) => {
                return Err(Error::ConfigRender(format!(
                    "config must be a JSON object, got {}",
                    json_type_name(other)
                )));
            }
        }

        Ok(serde_json::to_string(&model)?)
    }
}

/// Merge `overlay` into `base`, recursing into objects present in both.
fn merge_object(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                merge_object(existing, nested);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
