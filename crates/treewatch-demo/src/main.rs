#![forbid(unsafe_code)]

//! Scripted walkthrough of guarded observation over a live document.
//!
//! The default run installs the guarded factory, observes a subtree, plays
//! a batch of edits through the delivery pump, and then deliberately
//! misuses the observer surface to show every bad call degrading to a
//! diagnostic. `--strict` drives the raw subsystem instead, where the same
//! misuse aborts the run on the first fault.

mod cli;

use std::error::Error;
use std::rc::Rc;

use treewatch_core::platform;
use treewatch_core::{Document, NodeRef, ObserveOptions, Observer, tree_observer};
use treewatch_guard::{
    DiagnosticSink, GuardedFactory, JsonlConfig, JsonlSink, TracingSink, install_with_sink,
};

fn main() {
    let opts = cli::Opts::parse();

    let filter = tracing_subscriber::EnvFilter::try_new(&opts.log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    platform::provide(tree_observer);
    tracing::info!(strict = opts.strict, "treewatch demo starting");

    if opts.strict {
        if let Err(e) = run_strict() {
            eprintln!("strict run failed: {e}");
            std::process::exit(1);
        }
        return;
    }

    let sink: Rc<dyn DiagnosticSink> = match &opts.jsonl {
        Some(path) => match JsonlSink::from_config(&JsonlConfig::file(path)) {
            Ok(sink) => {
                tracing::info!(%path, "guard diagnostics routed to JSONL");
                Rc::new(sink)
            }
            Err(e) => {
                eprintln!("Failed to open {path}: {e}");
                std::process::exit(1);
            }
        },
        None => Rc::new(TracingSink),
    };

    let Some(factory) = install_with_sink(sink) else {
        eprintln!("No observer support on this platform");
        std::process::exit(1);
    };

    if let Err(e) = run_guarded(&factory) {
        eprintln!("Demo failed: {e}");
        std::process::exit(1);
    }
}

fn run_guarded(factory: &GuardedFactory) -> Result<(), Box<dyn Error>> {
    let doc = Document::new();
    let root = doc.root();
    let header = child(&root, "header")?;
    let content = child(&root, "content")?;
    let footer = child(&root, "footer")?;

    let observer = factory.observer(|records| {
        println!("delivered a batch of {} record(s):", records.len());
        for record in records {
            match &record.attribute_name {
                Some(name) => println!("  {} on {} ({name})", record.kind, record.target),
                None => println!("  {} on {}", record.kind, record.target),
            }
        }
    });

    let options = ObserveOptions::new()
        .child_list(true)
        .attributes(true)
        .attribute_old_value(true)
        .character_data(true)
        .character_data_old_value(true)
        .subtree(true);
    observer.observe(Some(&content), Some(&options));

    println!("== scripted edits under the observed subtree ==");
    let mut rows = Vec::new();
    for i in 0..3 {
        let row = child(&content, &format!("row-{i}"))?;
        row.set_attribute("state", "ready");
        rows.push(row);
    }
    rows[0].set_attribute("state", "busy");
    rows[1].set_text("first draft");
    rows[1].set_text("final copy");
    rows[2].remove();

    // Sibling edits fall outside the observed subtree and queue nothing.
    header.set_attribute("state", "ignored");
    footer.set_text("also ignored");

    let delivered = doc.deliver_pending();
    println!("pump delivered {delivered} record(s) total");

    println!("== synchronous drain, no pump ==");
    content.set_attribute("phase", "two");
    let drained = observer.take_records();
    println!("take_records returned {} record(s)", drained.len());

    println!("== misuse drill ==");
    let ephemeral = child(&content, "ephemeral")?;
    ephemeral.remove();

    // Each rejected call lands on the sink as one diagnostic; the repeated
    // disconnect is a legitimate no-op and stays silent.
    observer.observe(None, Some(&options));
    observer.observe(Some(&ephemeral), Some(&options));
    observer.observe(Some(&header), None);
    observer.disconnect();
    observer.disconnect();

    let leftover = observer.take_records();
    println!(
        "still running; {} record(s) left after disconnect",
        leftover.len()
    );
    Ok(())
}

/// Same script shape as the guarded run, but driven through the raw
/// subsystem. The first fault propagates and aborts the process.
fn run_strict() -> Result<(), Box<dyn Error>> {
    let Some(ctor) = platform::constructor() else {
        return Err("no observer support on this platform".into());
    };

    let doc = Document::new();
    let root = doc.root();
    let content = child(&root, "content")?;

    let observer = ctor(Box::new(|records| {
        println!("delivered a batch of {} record(s)", records.len());
    }));
    let options = ObserveOptions::new().child_list(true).subtree(true);
    observer.observe(Some(&content), Some(&options))?;

    child(&content, "row-0")?;
    let delivered = doc.deliver_pending();
    println!("pump delivered {delivered} record(s)");

    // The guarded run absorbs this call; here it ends the program.
    observer.observe(None, Some(&options))?;
    Ok(())
}

fn child(parent: &NodeRef, label: &str) -> Result<NodeRef, Box<dyn Error>> {
    parent
        .append_child(label)
        .ok_or_else(|| format!("could not append {label:?}: parent is not live").into())
}
