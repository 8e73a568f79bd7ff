use std::rc::Rc;

use clap::Args;
use tokio::sync::mpsc;
use tomate_core::events::channel;
use tomate_core::{
    format_time_left, Bus, Config, Payload, Plugin, SessionType, Signal, Subscriptions,
    TokioScheduler, Tomate,
};
use tracing::{debug, info, warn};

#[derive(Args)]
pub struct RunArgs {
    /// Number of consecutive intervals to run
    #[arg(long, default_value_t = 1)]
    intervals: u32,
    /// Interval type to begin with (pomodoro, shortbreak, longbreak)
    #[arg(long = "type", value_name = "KIND")]
    kind: Option<SessionType>,
    /// Task name attached to the session
    #[arg(long)]
    task: Option<String>,
    /// Run the clock this many times faster
    #[arg(long, default_value_t = 1.0, value_parser = parse_speedup)]
    speedup: f64,
    /// Override a config value (key=value, repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

fn parse_speedup(s: &str) -> Result<f64, String> {
    let factor: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !factor.is_finite() || factor < 1.0 {
        return Err(format!("expected a finite factor of at least 1, got {s}"));
    }
    Ok(factor)
}

/// Prints timer and session notifications to stdout, one JSON object per line.
struct JsonPrinter;

impl Plugin for JsonPrinter {
    fn name(&self) -> &str {
        "json-printer"
    }

    fn connect(self: Rc<Self>, bus: &Bus, subscriptions: &mut Subscriptions) {
        for name in [channel::TIMER, channel::SESSION] {
            let ch = bus.signal(name);
            let id = ch.connect(None, |event| match event.to_json() {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to serialize event"),
            });
            subscriptions.add(&ch, id);
        }
    }
}

/// Logs the time left once a minute.
struct Progress;

impl Plugin for Progress {
    fn name(&self) -> &str {
        "progress"
    }

    fn connect(self: Rc<Self>, bus: &Bus, subscriptions: &mut Subscriptions) {
        let ch = bus.signal(channel::TIMER);
        let id = ch.connect(Some(Signal::Changed.into()), |event| {
            if let Payload::Timer(timer) = &event.payload {
                if timer.time_left % 60 == 0 {
                    info!(left = %format_time_left(timer.time_left), "tick");
                }
            }
        });
        subscriptions.add(&ch, id);
    }
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::default();
    config.apply_overrides(&args.overrides)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, drive(config, args))
}

async fn drive(config: Config, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = TokioScheduler::accelerated(args.speedup);
    let mut app = Tomate::new(config, Rc::new(scheduler));
    app.plugins.activate(Rc::new(JsonPrinter));
    app.plugins.activate(Rc::new(Progress));
    debug!(
        speedup = scheduler.speedup(),
        channels = ?app.bus.names(),
        plugins = ?app.plugins.active(),
        "ready"
    );

    if let Some(task) = args.task {
        app.session.set_task_name(task);
    }
    if let Some(kind) = args.kind {
        app.session.change(Some(kind));
    }

    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel::<()>();
    app.bus
        .signal(channel::SESSION)
        .connect(Some(Signal::Finished.into()), move |_| {
            let _ = finished_tx.send(());
        });

    for n in 1..=args.intervals {
        info!(interval = n, of = args.intervals, kind = %app.session.current(), "starting interval");
        if !app.session.start()? {
            return Err("session refused to start".into());
        }
        if finished_rx.recv().await.is_none() {
            break;
        }
    }

    let status = app.session.status()?;
    info!(completed = status.count, next = %status.current, "done");
    Ok(())
}
