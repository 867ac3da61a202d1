use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use console_proxy::{CommandProxy, ProxyConfig};
use console_runtime::{
    ClassBuilder, ErrorCode, HostError, Interpreter, Param, PrimitiveKind, Value,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless demo world driven by remote console commands", long_about = None)]
struct Args {
    /// Path to a proxy config JSON file (defaults to $CONSOLE_PROXY_CONFIG, then the builtin config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind address from the config
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Logic frame length (milliseconds)
    #[arg(long, default_value_t = 33)]
    tick_ms: u64,

    /// Stop after this many frames; runs until killed when omitted
    #[arg(long)]
    frames: Option<u32>,
}

struct Actor {
    name: String,
    x: Cell<f64>,
    y: Cell<f64>,
    vx: Cell<f64>,
    vy: Cell<f64>,
    health: Cell<i64>,
}

struct World {
    actors: RefCell<Vec<Rc<Actor>>>,
    time_scale: Cell<f64>,
}

impl World {
    fn new() -> Self {
        Self {
            actors: RefCell::new(Vec::new()),
            time_scale: Cell::new(1.0),
        }
    }

    fn spawn(&self, name: &str, x: f64, y: f64) -> Rc<Actor> {
        let actor = Rc::new(Actor {
            name: name.to_string(),
            x: Cell::new(x),
            y: Cell::new(y),
            vx: Cell::new(0.0),
            vy: Cell::new(0.0),
            health: Cell::new(100),
        });
        self.actors.borrow_mut().push(Rc::clone(&actor));
        actor
    }

    fn find(&self, name: &str) -> Option<Rc<Actor>> {
        self.actors
            .borrow()
            .iter()
            .find(|actor| actor.name == name)
            .cloned()
    }

    fn step(&self, dt: f64) {
        let dt = dt * self.time_scale.get();
        for actor in self.actors.borrow().iter() {
            actor.x.set(actor.x.get() + actor.vx.get() * dt);
            actor.y.set(actor.y.get() + actor.vy.get() * dt);
        }
    }
}

fn number(value: &Value) -> f64 {
    value.as_numeric().map_or(0.0, |n| n.to_f64())
}

fn register_demo(
    console: &mut Interpreter,
    world: Rc<World>,
    frame: Rc<Cell<i32>>,
    started: Instant,
) -> Result<()> {
    let double = || Param::of(PrimitiveKind::Double);
    let string = || Param::of(PrimitiveKind::String);

    console.register_type(
        ClassBuilder::<Actor>::new("Actor")
            .namespace("Game")
            .field("Name", PrimitiveKind::String.handle(), |actor| {
                Value::from(actor.name.as_str())
            })
            .field_rw(
                "Health",
                PrimitiveKind::Int.handle(),
                |actor| Value::from(actor.health.get()),
                |actor, value| {
                    actor.health.set(value.as_numeric().map_or(0, |n| n.to_i64()));
                    Ok(())
                },
            )
            .field("X", PrimitiveKind::Double.handle(), |actor| Value::from(actor.x.get()))
            .field("Y", PrimitiveKind::Double.handle(), |actor| Value::from(actor.y.get()))
            .method("MoveTo", vec![double(), double()], |actor, call| {
                actor.x.set(call.float_arg(0)?);
                actor.y.set(call.float_arg(1)?);
                Ok(Value::Void)
            })
            .method(
                "SetVelocity",
                vec![double(), double().with_default(0.0)],
                |actor, call| {
                    actor.vx.set(number(call.arg(0)?));
                    actor.vy.set(number(call.arg(1)?));
                    Ok(Value::Void)
                },
            )
            .display(|actor| {
                format!("Actor({} @ {:.1}, {:.1})", actor.name, actor.x.get(), actor.y.get())
            })
            .build(),
    );

    console.register_type(
        ClassBuilder::<World>::new("World")
            .namespace("Game")
            .field("Count", PrimitiveKind::Int.handle(), |world| {
                Value::from(world.actors.borrow().len())
            })
            .field_rw(
                "TimeScale",
                PrimitiveKind::Double.handle(),
                |world| Value::from(world.time_scale.get()),
                |world, value| {
                    world.time_scale.set(number(&value));
                    Ok(())
                },
            )
            .method(
                "Spawn",
                vec![string(), double().with_default(0.0), double().with_default(0.0)],
                |world, call| {
                    let actor =
                        world.spawn(call.str_arg(0)?, number(call.arg(1)?), number(call.arg(2)?));
                    call.wrap(actor)
                },
            )
            .method("Find", vec![string()], |world, call| {
                match world.find(call.str_arg(0)?) {
                    Some(actor) => call.wrap(actor),
                    None => Ok(Value::Null),
                }
            })
            .indexer(|world, index, call| {
                let slot = index
                    .as_numeric()
                    .filter(|n| n.is_integer())
                    .ok_or_else(|| {
                        HostError::with_code(
                            ErrorCode::InvalidArgumentType,
                            "world index must be an integer",
                        )
                    })?
                    .to_i64();
                let actor = usize::try_from(slot)
                    .ok()
                    .and_then(|slot| world.actors.borrow().get(slot).cloned())
                    .ok_or_else(|| {
                        HostError::with_code(
                            ErrorCode::IndexOutOfRange,
                            format!("no actor at index {slot}"),
                        )
                    })?;
                call.wrap(actor)
            })
            .display(|world| format!("World({} actors)", world.actors.borrow().len()))
            .build(),
    );

    console
        .register_object("world", world)
        .context("World type was not registered")?;
    console.register_preset_variable("frame", move || Ok(Value::from(frame.get())));
    console.register_preset_variable("uptime", move || {
        Ok(Value::from(started.elapsed().as_secs_f64()))
    });
    console.register_preset_func("log", vec![string()], |call| {
        info!(target: "console::host", message = call.str_arg(0)?, "console.log");
        Ok(Value::Void)
    });
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ProxyConfig::from_file(path)
            .with_context(|| format!("Failed to load proxy config at {}", path.display()))?,
        None => ProxyConfig::from_env().context("Failed to load proxy config")?,
    };
    if let Some(bind) = args.bind {
        config = config.with_bind(bind);
    }

    let world = Rc::new(World::new());
    world.spawn("Scout", 0.0, 0.0);
    let frame = Rc::new(Cell::new(0i32));
    let started = Instant::now();

    let mut console = Interpreter::new();
    register_demo(&mut console, Rc::clone(&world), Rc::clone(&frame), started)?;

    let mut proxy = CommandProxy::new(config, console);
    let addr = proxy.start().context("Failed to start command proxy")?;
    info!(
        target: "console::host",
        command_bind = %addr,
        tick_ms = args.tick_ms,
        "Console host ready"
    );

    let tick = Duration::from_millis(args.tick_ms.max(1));
    let mut next_tick = Instant::now();
    loop {
        let current = frame.get().saturating_add(1);
        frame.set(current);
        world.step(tick.as_secs_f64());
        proxy.process_pending_commands(current);

        if args
            .frames
            .is_some_and(|limit| u32::try_from(current).is_ok_and(|current| current >= limit))
        {
            break;
        }
        next_tick += tick;
        if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }

    let stats = proxy.stats();
    proxy.stop();
    info!(
        target: "console::host",
        frames = frame.get(),
        executed = stats.executed,
        failed = stats.failed,
        "Console host stopped"
    );
    Ok(())
}
