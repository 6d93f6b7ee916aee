use flow::errors::FlowError;
use flow::stubs::InMemoryResourceStore;
use flow::{enrich_params, Action, ParamMap, ParamType, ResourceStore, ServeType, Step, STEP_KIND};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), FlowError> {
    let store = InMemoryResourceStore::new();
    let ns = "example";

    // Acción y dos steps que la usan
    let action = store.put_action(ns,
                                  &Action::new("notify", ServeType::Http, "http://localhost:8080/notify")
                                      .with_param("email", ParamType::Str)
                                      .with_return_states(&["ok", "fail"]))?;
    println!("action {} v{}", action.metadata.name, action.metadata.resource_version);

    let params: ParamMap = serde_json::from_value(json!({"email": "ops@example.com"}))?;
    for name in ["s1", "s2"] {
        let step = store.put_step(ns, &Step::new(name, "flow-1", "notify", params.clone()))?;
        println!("step {} v{}", step.name(), step.metadata.resource_version);
    }

    // Suscripción desde la versión 2: sólo llega s2, luego lo que se escriba
    let mut stream = store.watch(ns, STEP_KIND, 2).await?;
    store.mark_step_done(ns, "s1")?;
    for _ in 0..2 {
        if let Some(event) = stream.next().await {
            println!("evento v{} {}", event.version, event.name());
        }
    }

    // Parámetros tal como los recibiría la acción
    let step: Step = serde_json::from_value(store.get(ns, STEP_KIND, "s2").await?)?;
    println!("params: {:?}", enrich_params(&step, &action));
    Ok(())
}
