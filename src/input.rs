// Keyboard state and key-to-command mapping
//
// Keys are grouped by axis. Within a group the first key wins when both are
// held; groups are independent, so diagonal input issues one command each.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commander::Direction;

/// Keys the teleop listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    W,
    S,
    A,
    D,
}

impl Key {
    pub fn from_code(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Up => Some(Key::Up),
            KeyCode::Down => Some(Key::Down),
            KeyCode::Left => Some(Key::Left),
            KeyCode::Right => Some(Key::Right),
            KeyCode::Char(c) => match c.to_ascii_lowercase() {
                'w' => Some(Key::W),
                's' => Some(Key::S),
                'a' => Some(Key::A),
                'd' => Some(Key::D),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Read-only view of which keys are currently down
pub trait KeyState {
    fn is_pressed(&self, key: Key) -> bool;
}

impl KeyState for HashSet<Key> {
    fn is_pressed(&self, key: Key) -> bool {
        self.contains(&key)
    }
}

/// What one key press asks the vehicle to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Move(Direction),
    TurnRight,
    TurnLeft,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move(direction) => write!(f, "Moving {}", direction),
            Action::TurnRight => f.write_str("Turning right"),
            Action::TurnLeft => f.write_str("Turning left"),
        }
    }
}

/// Two mutually exclusive keys; `primary` wins a tie
#[derive(Debug, Clone, Copy)]
pub struct AxisGroup {
    pub primary: (Key, Action),
    pub secondary: (Key, Action),
}

impl AxisGroup {
    pub fn resolve(&self, keys: &impl KeyState) -> Option<Action> {
        if keys.is_pressed(self.primary.0) {
            Some(self.primary.1)
        } else if keys.is_pressed(self.secondary.0) {
            Some(self.secondary.1)
        } else {
            None
        }
    }
}

/// Groups in dispatch order
pub const AXIS_GROUPS: [AxisGroup; 4] = [
    // North/South
    AxisGroup {
        primary: (Key::Up, Action::Move(Direction::North)),
        secondary: (Key::Down, Action::Move(Direction::South)),
    },
    // East/West
    AxisGroup {
        primary: (Key::Right, Action::Move(Direction::East)),
        secondary: (Key::Left, Action::Move(Direction::West)),
    },
    // Up/Down
    AxisGroup {
        primary: (Key::W, Action::Move(Direction::Up)),
        secondary: (Key::S, Action::Move(Direction::Down)),
    },
    // Rotate
    AxisGroup {
        primary: (Key::D, Action::TurnRight),
        secondary: (Key::A, Action::TurnLeft),
    },
];

/// At most one action per axis group, in group order
pub fn select_actions(keys: &impl KeyState) -> Vec<Action> {
    AXIS_GROUPS
        .iter()
        .filter_map(|group| group.resolve(keys))
        .collect()
}

/// Held-key tracking from a stream of key events
///
/// With release events a key is held from press until release. Without them
/// a key counts as held for `repeat_delay` after its first press, long enough
/// for OS autorepeat to start, and for `hold` after each repeat.
#[derive(Debug, Clone)]
pub struct HeldKeys {
    held_until: HashMap<Key, Instant>,
    hold: Duration,
    repeat_delay: Duration,
    release_events: bool,
}

impl HeldKeys {
    pub fn new(hold: Duration, repeat_delay: Duration, release_events: bool) -> Self {
        Self {
            held_until: HashMap::new(),
            hold,
            repeat_delay,
            release_events,
        }
    }

    /// Initial press of a key
    pub fn press(&mut self, key: Key, at: Instant) {
        self.held_until.insert(key, at + self.repeat_delay.max(self.hold));
    }

    /// Autorepeat of a key that is already down
    pub fn repeat(&mut self, key: Key, at: Instant) {
        let until = at + self.hold;
        // A repeat never shortens the window its press opened
        let entry = self.held_until.entry(key).or_insert(until);
        *entry = (*entry).max(until);
    }

    pub fn release(&mut self, key: Key) {
        self.held_until.remove(&key);
    }

    pub fn is_pressed_at(&self, key: Key, now: Instant) -> bool {
        match self.held_until.get(&key) {
            None => false,
            Some(_) if self.release_events => true,
            Some(&until) => now <= until,
        }
    }

    fn apply(&mut self, event: &KeyEvent, at: Instant) {
        let Some(key) = Key::from_code(event.code) else {
            return;
        };
        match event.kind {
            KeyEventKind::Press => self.press(key, at),
            KeyEventKind::Repeat => self.repeat(key, at),
            KeyEventKind::Release => self.release(key),
        }
        debug!("{:?} {:?}", key, event.kind);
    }
}

impl KeyState for HeldKeys {
    fn is_pressed(&self, key: Key) -> bool {
        self.is_pressed_at(key, Instant::now())
    }
}

/// A key state source the input loop refreshes once per iteration
pub trait Keyboard: KeyState {
    /// Take in whatever input the host has delivered since the last call
    fn refresh(&mut self) -> io::Result<()>;
}

/// How often the reader thread checks whether it should stop
const READER_POLL: Duration = Duration::from_millis(50);

/// Blocking source of terminal events
pub trait EventSource: Send + 'static {
    /// Next event, or `None` if nothing arrived within `timeout`
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Event>>;
}

/// Events from the process's terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct CrosstermEvents;

impl EventSource for CrosstermEvents {
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
        if event::poll(timeout)? {
            Ok(Some(event::read()?))
        } else {
            Ok(None)
        }
    }
}

/// Keyboard fed by a reader thread
///
/// The thread handles Esc, `q` and Ctrl+C itself by cancelling the loop's
/// token, so quitting works while the loop is blocked in a command. Other
/// key events are queued for [`Keyboard::refresh`].
pub struct EventKeyboard {
    held: HeldKeys,
    events: mpsc::Receiver<KeyEvent>,
    poll_window: Duration,
    stop: CancellationToken,
    reader: Option<thread::JoinHandle<()>>,
}

impl EventKeyboard {
    pub fn spawn(
        source: impl EventSource,
        held: HeldKeys,
        poll_window: Duration,
        cancel: &CancellationToken,
    ) -> io::Result<Self> {
        let (tx, events) = mpsc::channel();
        // Stops with the keyboard, or as soon as the loop is cancelled
        let stop = cancel.child_token();
        let reader = thread::Builder::new().name("keyboard".to_string()).spawn({
            let quit = cancel.clone();
            let stop = stop.clone();
            move || read_events(source, tx, quit, stop)
        })?;

        Ok(Self {
            held,
            events,
            poll_window,
            stop,
            reader: Some(reader),
        })
    }
}

fn read_events(
    mut source: impl EventSource,
    tx: mpsc::Sender<KeyEvent>,
    quit: CancellationToken,
    stop: CancellationToken,
) {
    while !stop.is_cancelled() {
        match source.next_event(READER_POLL) {
            Ok(Some(Event::Key(key_event))) => {
                if is_quit(&key_event) {
                    info!("Quit requested");
                    quit.cancel();
                } else if tx.send(key_event).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Keyboard read failed: {}", e);
                quit.cancel();
                break;
            }
        }
    }
    debug!("Keyboard reader stopped");
}

fn is_quit(event: &KeyEvent) -> bool {
    if event.kind == KeyEventKind::Release {
        return false;
    }
    match event.code {
        KeyCode::Esc | KeyCode::Char('q') => true,
        KeyCode::Char('c') => event.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

impl KeyState for EventKeyboard {
    fn is_pressed(&self, key: Key) -> bool {
        self.held.is_pressed(key)
    }
}

impl Keyboard for EventKeyboard {
    fn refresh(&mut self) -> io::Result<()> {
        // Wait for the first event, then drain whatever else is queued
        let first = match self.events.recv_timeout(self.poll_window) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => return Ok(()),
            Err(RecvTimeoutError::Disconnected) if self.stop.is_cancelled() => return Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "keyboard reader stopped",
                ));
            }
        };
        self.held.apply(&first, Instant::now());
        while let Ok(event) = self.events.try_recv() {
            self.held.apply(&event, Instant::now());
        }
        Ok(())
    }
}

impl Drop for EventKeyboard {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("Keyboard reader panicked");
            }
        }
    }
}

/// Raw mode and keyboard flags, undone on drop
struct TerminalMode {
    enhanced: bool,
    restore: fn(bool),
}

impl TerminalMode {
    fn enter() -> io::Result<Self> {
        Self::enter_with(enable_raw_mode, push_enhancement, restore_terminal)
    }

    fn enter_with(
        enable_raw: impl FnOnce() -> io::Result<()>,
        push_flags: impl FnOnce() -> io::Result<bool>,
        restore: fn(bool),
    ) -> io::Result<Self> {
        enable_raw()?;
        // From here on an early return drops `mode` and leaves raw mode
        let mut mode = Self {
            enhanced: false,
            restore,
        };
        mode.enhanced = push_flags()?;
        Ok(mode)
    }
}

impl Drop for TerminalMode {
    fn drop(&mut self) {
        (self.restore)(self.enhanced);
    }
}

/// Request release events; `false` when the terminal cannot report them
fn push_enhancement() -> io::Result<bool> {
    if !matches!(supports_keyboard_enhancement(), Ok(true)) {
        return Ok(false);
    }
    execute!(
        io::stdout(),
        PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
    )?;
    Ok(true)
}

fn restore_terminal(enhanced: bool) {
    if enhanced {
        if let Err(e) = execute!(io::stdout(), PopKeyboardEnhancementFlags) {
            warn!("Failed to restore keyboard mode: {}", e);
        }
    }
    if let Err(e) = disable_raw_mode() {
        warn!("Failed to leave raw mode: {}", e);
    }
}

/// Keyboard read from the controlling terminal
///
/// Puts the terminal in raw mode for its lifetime. Esc, `q` and Ctrl+C
/// cancel `cancel`.
pub struct TerminalKeyboard {
    // Declared first so the reader stops before the terminal is restored
    keys: EventKeyboard,
    _mode: TerminalMode,
}

impl TerminalKeyboard {
    pub fn open(
        hold: Duration,
        repeat_delay: Duration,
        poll_window: Duration,
        cancel: &CancellationToken,
    ) -> io::Result<Self> {
        let mode = TerminalMode::enter()?;
        if mode.enhanced {
            info!("Key release events enabled");
        } else {
            info!(
                "No key release events; keys count as held for {}ms after a press, {}ms after a repeat",
                repeat_delay.as_millis(),
                hold.as_millis()
            );
        }

        let held = HeldKeys::new(hold, repeat_delay, mode.enhanced);
        let keys = EventKeyboard::spawn(CrosstermEvents, held, poll_window, cancel)?;
        Ok(Self { keys, _mode: mode })
    }
}

impl KeyState for TerminalKeyboard {
    fn is_pressed(&self, key: Key) -> bool {
        self.keys.is_pressed(key)
    }
}

impl Keyboard for TerminalKeyboard {
    fn refresh(&mut self) -> io::Result<()> {
        self.keys.refresh()
    }
}
