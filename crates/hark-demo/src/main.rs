#![forbid(unsafe_code)]

//! Walkthrough of the `hark` operations on a few toy objects.
//!
//! Logging is configured from `RUST_LOG` (default `hark=debug,hark_demo=info`).
//! Set `HARK_DEMO_LOG_JSON=1` for JSON lines. Hub behavior reads the usual
//! `HARK_*` variables.

use std::cell::Cell;
use std::error::Error;
use std::rc::Rc;

use hark::{
    AttributeSource, Evented, EventedExt, Events, HarkConfig, ObservedExt, Properties,
    SourceId, Subscription,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "hark=debug,hark_demo=info";

struct Earth {
    events: Events,
}

impl Evented for Earth {
    fn events(&self) -> &Events {
        &self.events
    }
}

struct Observer {
    name: &'static str,
    events: Events,
}

impl Evented for Observer {
    fn events(&self) -> &Events {
        &self.events
    }
}

struct Checkbox {
    events: Events,
    props: Properties<bool>,
}

impl Evented for Checkbox {
    fn events(&self) -> &Events {
        &self.events
    }
}

impl AttributeSource for Checkbox {
    fn source_id(&self) -> SourceId {
        self.props.source_id()
    }

    fn subscribe_path(&self, path: &str, callback: Box<dyn Fn()>) -> Subscription {
        self.props.subscribe_path(path, callback)
    }
}

/// Tallies of what the walkthrough observed.
#[derive(Debug, Default, PartialEq, Eq)]
struct Report {
    shape_changes: u32,
    ready: u32,
    scoped: u32,
    redraws: u32,
    destroyed: u32,
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("HARK_DEMO_LOG_JSON")
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config() -> HarkConfig {
    let parsed = HarkConfig::from_env_with_diagnostics();
    for err in &parsed.errors {
        warn!(error = %err, "ignoring invalid setting");
    }
    parsed.config
}

fn tally(slot: &Rc<Cell<u32>>) -> impl Fn() + 'static {
    let slot = Rc::clone(slot);
    move || slot.set(slot.get() + 1)
}

fn run(config: &HarkConfig) -> hark::Result<Report> {
    let shape_changes = Rc::new(Cell::new(0));
    let ready = Rc::new(Cell::new(0));
    let scoped = Rc::new(Cell::new(0));
    let redraws = Rc::new(Cell::new(0));
    let destroyed = Rc::new(Cell::new(0));

    let earth = Earth {
        events: Events::with_config(config.clone()),
    };

    // Same logic registered three times runs three times.
    for _ in 0..3 {
        earth.on("shapeChanged", tally(&shape_changes))?;
    }
    let invoked = earth.trigger("shapeChanged")?;
    info!(invoked, "earth changed shape");

    earth.on_with_context("shapeChanged", |ctx| {
        if let Some(shape) = ctx.and_then(|c| c.downcast_ref::<&str>()) {
            info!(shape, "new shape reported");
        }
    })?;
    earth.trigger_with_context("shapeChanged", &"flat")?;

    earth.on_once("ready", tally(&ready))?;
    earth.trigger("ready")?;
    earth.trigger("ready")?;
    info!(fired = ready.get(), "ready handled once");

    let observer = Observer {
        name: "telescope",
        events: Events::with_config(config.clone()),
    };
    earth.when(&observer, "spin", tally(&scoped))?;
    earth.trigger("spin")?;
    info!(observer = observer.name, "observer retiring");
    observer.destroy();
    earth.trigger("spin")?;
    info!(fired = scoped.get(), "scoped handler stopped with its owner");

    let checkbox = Checkbox {
        events: Events::with_config(config.clone()),
        props: Properties::with_values([("selected", false), ("highlighted", false)]),
    };
    checkbox.on_change_of_any(["selected", "highlighted"], tally(&redraws))?;
    checkbox.props.set("selected", true);
    checkbox.props.set("highlighted", true);
    checkbox.props.set("highlighted", true);
    info!(redraws = redraws.get(), "checkbox redrawn");

    checkbox.set_on_destroy(tally(&destroyed))?;
    earth.set_on_destroy(tally(&destroyed))?;
    drop(checkbox);
    earth.destroy();
    info!(callbacks = destroyed.get(), "objects destroyed");

    Ok(Report {
        shape_changes: shape_changes.get(),
        ready: ready.get(),
        scoped: scoped.get(),
        redraws: redraws.get(),
        destroyed: destroyed.get(),
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let config = load_config();
    info!(?config, "starting");
    let report = run(&config)?;
    info!(?report, "done");
    Ok(())
}
