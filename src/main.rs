//! propbus demo - exports a sample service record on an in-process bus.
//!
//! Walks the remote surface once (Get, Set, SetBatch, Introspect, a refused
//! write), then bumps `Index` on a ticker and announces each change until
//! Ctrl-C.

use clap::Parser;
use propbus::bus::{Bus, LocalBus, MethodCall};
use propbus::{
    AttributeRegistry, ChangeHook, Config, Error, FieldDescriptor, InterfaceName, ObjectPath,
    SlotWriter, Type, Value,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "propbus-demo", about = "Export a sample record as bus properties")]
struct Args {
    /// JSON configuration file.
    #[arg(long, env = "PROPBUS_CONFIG")]
    config: Option<PathBuf>,

    /// Object path to export the record at.
    #[arg(long, default_value = "/com/example/Service")]
    path: String,

    /// Interface the record's properties belong to.
    #[arg(long, default_value = "com.example.Service")]
    interface: String,

    /// Seconds between `Index` bumps.
    #[arg(long, default_value_t = 2)]
    interval: u64,
}

/// Owner of the exported record. Refuses to clear the token.
#[derive(Debug)]
struct Service;

impl ChangeHook for Service {
    fn change(
        &self,
        keys: &[String],
        values: &BTreeMap<String, Value>,
        _writer: &mut SlotWriter<'_>,
    ) -> propbus::Result<()> {
        if let Some(Value::Str(token)) = values.get("Token") {
            if token.is_empty() {
                return Err(Error::invalid_argument("Token must not be empty"));
            }
        }
        tracing::info!("Service accepted write of {:?}", keys);
        Ok(())
    }
}

fn service_record() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("ID", "2").tag("const,emit"),
        FieldDescriptor::new("Name", "lisi").tag("writeable,emit"),
        FieldDescriptor::unset("Token", Type::String).tag("writeable,emit"),
        FieldDescriptor::new("Index", 1i32).tag("writeable,emit"),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Initialize observability
    propbus::observability::init_tracing_with(&config.observability);

    let path = ObjectPath::new(args.path.as_str())?;
    let interface = InterfaceName::new(args.interface.as_str())?;
    let bus = LocalBus::new(config.bus.clone());

    let owner = Arc::new(Service);
    let registry = Arc::new(
        AttributeRegistry::new(&service_record())?
            .with_interface(interface.clone())
            .with_change_hook(&owner),
    );
    let handle: Arc<dyn Bus> = Arc::new(bus.clone());
    registry.export(handle, path.clone()).await?;

    let cancel = CancellationToken::new();
    let (subscription, mut signals) = bus.subscribe("", Some(path.clone())).await;
    let listener = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = signals.recv() => match msg {
                        Some(msg) => tracing::info!(
                            "{} from {}: changed={:?} invalidated={:?}",
                            msg.member,
                            msg.path,
                            msg.body.changed_properties,
                            msg.body.invalidated_properties
                        ),
                        None => break,
                    },
                }
            }
        })
    };

    walk_surface(&bus, &path, interface.as_str()).await;

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    tracing::info!("Demo running at {} ({}); Ctrl-C to stop", path, interface);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let index = registry
                    .update(|w| {
                        let next = next_index(w.get("Index"))?;
                        w.set("Index", next)?;
                        Ok(next)
                    })
                    .await?;
                registry.emit_changes(interface.as_str(), &["Index"]).await?;
                tracing::debug!("Index bumped to {}", index);
            }
        }
    }

    bus.unsubscribe(&subscription).await;
    registry.unexport().await?;
    listener.await?;
    tracing::info!("Demo stopped: {:?}", bus.get_stats().await);
    Ok(())
}

/// Successor of the current `Index`; an unset index starts from zero.
fn next_index(current: Option<&Value>) -> propbus::Result<i32> {
    let current = current.and_then(Value::as_i64).unwrap_or(0);
    i32::try_from(current)
        .ok()
        .and_then(|i| i.checked_add(1))
        .ok_or_else(|| Error::invalid_argument(format!("Index {} cannot be incremented", current)))
}

/// Exercise every properties method once through the bus.
async fn walk_surface(bus: &LocalBus, path: &ObjectPath, interface: &str) {
    let mut batch = BTreeMap::new();
    batch.insert("Name".to_string(), Value::from("wangwu"));
    batch.insert("Index".to_string(), Value::from(10i32));

    let calls = vec![
        MethodCall::get(path.clone(), interface, "Token"),
        MethodCall::set(path.clone(), interface, "Token", Value::from("t0k3n")),
        MethodCall::get(path.clone(), interface, "Token"),
        MethodCall::set(path.clone(), interface, "Token", Value::from("")),
        MethodCall::set(path.clone(), interface, "ID", Value::from("3")),
        MethodCall::set_batch(path.clone(), interface, vec![], batch),
        MethodCall::get_all(path.clone(), interface),
        MethodCall::introspect(path.clone()),
    ];

    for call in calls {
        let label = format!("{}.{}", call.interface, call.member);
        match bus.call(call).await {
            Ok(reply) => tracing::info!("{} -> {:?}", label, reply),
            Err(e) => tracing::warn!("{} failed [{}]: {}", label, e.bus_error_name(), e),
        }
    }
}
