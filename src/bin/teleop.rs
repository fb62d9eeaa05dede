// Keyboard teleop for the drivehub runtime
//
// Keys: W/S drive, A/D turn, R/F gear up/down, space coast, B brake,
// H zero heading, Q or Esc quit. Drive keys must be held (key repeat); the
// motion falls back to zero shortly after the last one.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

use drivehub_runtime::config::{LOOP_HZ, TOPIC_CMD_DRIVE};
use drivehub_runtime::messages::DriveCommand;
use drivehub_runtime::motor::Actuation;

/// Held motion is dropped this long after the last drive key
const HOLD_TIMEOUT: Duration = Duration::from_millis(100);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gear {
    Crawl,
    Cruise,
    Fast,
}

impl Gear {
    /// mm/s
    fn speed(self) -> i32 {
        match self {
            Gear::Crawl => 50,
            Gear::Cruise => 150,
            Gear::Fast => 300,
        }
    }

    /// deg/s
    fn turn_rate(self) -> i32 {
        match self {
            Gear::Crawl => 30,
            Gear::Cruise => 90,
            Gear::Fast => 180,
        }
    }

    fn up(self) -> Self {
        match self {
            Gear::Crawl => Gear::Cruise,
            _ => Gear::Fast,
        }
    }

    fn down(self) -> Self {
        match self {
            Gear::Fast => Gear::Cruise,
            _ => Gear::Crawl,
        }
    }
}

/// What a key press asks the main loop to do
#[derive(Debug, PartialEq)]
enum Action {
    Nothing,
    Send(DriveCommand),
    Quit,
}

/// Direction of travel and turn, each -1, 0 or 1, plus when it was last set
#[derive(Debug)]
struct Teleop {
    gear: Gear,
    forward: i32,
    clockwise: i32,
    held_at: Option<Instant>,
}

impl Teleop {
    fn new() -> Self {
        Self {
            gear: Gear::Crawl,
            forward: 0,
            clockwise: 0,
            held_at: None,
        }
    }

    fn hold(&mut self, forward: Option<i32>, clockwise: Option<i32>, now: Instant) {
        if let Some(forward) = forward {
            self.forward = forward;
        }
        if let Some(clockwise) = clockwise {
            self.clockwise = clockwise;
        }
        self.held_at = Some(now);
    }

    fn release(&mut self) {
        self.forward = 0;
        self.clockwise = 0;
        self.held_at = None;
    }

    fn on_key(&mut self, code: KeyCode, now: Instant) -> Action {
        match code {
            KeyCode::Char('w') => self.hold(Some(1), None, now),
            KeyCode::Char('s') => self.hold(Some(-1), None, now),
            KeyCode::Char('a') => self.hold(None, Some(-1), now),
            KeyCode::Char('d') => self.hold(None, Some(1), now),
            KeyCode::Char('r') => {
                self.gear = self.gear.up();
                info!("Gear: {:?}", self.gear);
            }
            KeyCode::Char('f') => {
                self.gear = self.gear.down();
                info!("Gear: {:?}", self.gear);
            }
            KeyCode::Char(' ') => {
                self.release();
                return Action::Send(DriveCommand::Stop {
                    mode: Actuation::Coast,
                });
            }
            KeyCode::Char('b') => {
                self.release();
                return Action::Send(DriveCommand::Stop {
                    mode: Actuation::Brake,
                });
            }
            KeyCode::Char('h') => {
                info!("Heading zeroed");
                return Action::Send(DriveCommand::SetHeading { heading: 0.0 });
            }
            KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,
            _ => {}
        }
        Action::Nothing
    }

    /// Drive command for this cycle; zero once the keys have been let go
    fn drive(&mut self, now: Instant) -> DriveCommand {
        if self
            .held_at
            .is_some_and(|at| now.saturating_duration_since(at) > HOLD_TIMEOUT)
        {
            self.release();
        }
        DriveCommand::Drive {
            speed: self.forward * self.gear.speed(),
            turn_rate: self.clockwise * self.gear.turn_rate(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_DRIVE).await?;

    info!("Controls: W/S=drive, A/D=turn, R/F=gear, SPACE=coast, B=brake, H=zero heading, Q=quit");

    enable_raw_mode()?;
    let result = run(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn publish(publisher: &zenoh::pubsub::Publisher<'_>, cmd: &DriveCommand) -> Result<(), BoxError> {
    publisher.put(serde_json::to_string(cmd)?).await?;
    Ok(())
}

async fn run(publisher: &zenoh::pubsub::Publisher<'_>) -> Result<(), BoxError> {
    let mut teleop = Teleop::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tick.tick().await;

        // Drain every key that arrived since the last cycle
        while event::poll(Duration::ZERO)? {
            let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
                continue;
            };
            if kind == KeyEventKind::Release {
                continue;
            }
            match teleop.on_key(code, Instant::now()) {
                Action::Nothing => {}
                Action::Send(cmd) => publish(publisher, &cmd).await?,
                Action::Quit => return Ok(()),
            }
        }

        // Sent every cycle; it keeps the watchdog fed and a zero drive coasts the base
        publish(publisher, &teleop.drive(Instant::now())).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(speed: i32, turn_rate: i32) -> DriveCommand {
        DriveCommand::Drive { speed, turn_rate }
    }

    #[test]
    fn test_held_keys_combine() {
        let mut teleop = Teleop::new();
        let now = Instant::now();
        assert_eq!(teleop.on_key(KeyCode::Char('w'), now), Action::Nothing);
        assert_eq!(teleop.on_key(KeyCode::Char('a'), now), Action::Nothing);
        assert_eq!(teleop.drive(now), drive(50, -30));

        teleop.on_key(KeyCode::Char('s'), now);
        teleop.on_key(KeyCode::Char('d'), now);
        assert_eq!(teleop.drive(now), drive(-50, 30));
    }

    #[test]
    fn test_motion_drops_after_release() {
        let mut teleop = Teleop::new();
        let now = Instant::now();
        teleop.on_key(KeyCode::Char('w'), now);
        assert_eq!(teleop.drive(now + HOLD_TIMEOUT), drive(50, 0));
        assert_eq!(teleop.drive(now + HOLD_TIMEOUT * 2), drive(0, 0));
        // Stays released until the next key
        assert_eq!(teleop.drive(now), drive(0, 0));
    }

    #[test]
    fn test_gears_saturate() {
        let mut teleop = Teleop::new();
        let now = Instant::now();
        for _ in 0..5 {
            teleop.on_key(KeyCode::Char('r'), now);
        }
        assert_eq!(teleop.gear, Gear::Fast);
        teleop.on_key(KeyCode::Char('w'), now);
        assert_eq!(teleop.drive(now), drive(300, 0));

        for _ in 0..5 {
            teleop.on_key(KeyCode::Char('f'), now);
        }
        assert_eq!(teleop.gear, Gear::Crawl);
        assert_eq!(Gear::Crawl.up().up().down(), Gear::Cruise);
    }

    #[test]
    fn test_stops_clear_motion() {
        let mut teleop = Teleop::new();
        let now = Instant::now();
        teleop.on_key(KeyCode::Char('w'), now);
        assert_eq!(
            teleop.on_key(KeyCode::Char('b'), now),
            Action::Send(DriveCommand::Stop {
                mode: Actuation::Brake
            })
        );
        assert_eq!(teleop.drive(now), drive(0, 0));

        assert!(matches!(
            teleop.on_key(KeyCode::Char(' '), now),
            Action::Send(DriveCommand::Stop {
                mode: Actuation::Coast
            })
        ));
        assert!(matches!(
            teleop.on_key(KeyCode::Char('h'), now),
            Action::Send(DriveCommand::SetHeading { .. })
        ));
        assert_eq!(teleop.on_key(KeyCode::Esc, now), Action::Quit);
        assert_eq!(teleop.on_key(KeyCode::Char('x'), now), Action::Nothing);
    }
}
