//! Keystrokes, paced packets and the editing state machines
//!
//! Everything here is pure bookkeeping. Echoing and continuation changes
//! happen in [`crate::context`], which owns the clock and the output path.

use host_api::{Duration, Instant};
use std::collections::VecDeque;
use std::fmt;

/// One unit of terminal traffic
///
/// A packet becomes readable once `delay` plus `lag` has passed since the
/// previous packet was taken. A packet with `lag: None` ignores network lag,
/// which is how per-character output follows its first character without
/// stalling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub payload: String,
    pub delay: Duration,
    pub lag: Option<Duration>,
}

impl Packet {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            delay: Duration::ZERO,
            lag: Some(Duration::ZERO),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_lag(mut self, lag: Option<Duration>) -> Self {
        self.lag = lag;
        self
    }

    /// Earliest time this packet may be taken, given the queue timer
    pub fn ready_at(&self, timer: Instant) -> Instant {
        timer + self.delay + self.lag.unwrap_or(Duration::ZERO)
    }
}

/// A decoded keystroke token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Enter,
    Interrupt,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Char(char),
    Other(String),
}

impl Key {
    /// Decodes a transport token; escape sequences alias to arrow keys
    pub fn parse(token: &str) -> Key {
        if token.contains('\r') {
            return Key::Enter;
        }
        match token {
            "^C" | "\x03" => Key::Interrupt,
            "^H" | "\x7f" | "\x08" => Key::Backspace,
            "[DELETE]" | "\x1b[3~" => Key::Delete,
            "\x1b[A" | "up" => Key::Up,
            "\x1b[B" | "down" => Key::Down,
            "\x1b[C" | "right" => Key::Right,
            "\x1b[D" | "left" => Key::Left,
            _ => {
                let mut chars = token.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => Key::Other(token.to_string()),
                }
            }
        }
    }

    /// Printable ASCII the line editor accepts
    pub fn printable(&self) -> Option<char> {
        match self {
            Key::Char(c) if (' '..='~').contains(c) => Some(*c),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Enter => Ok(()),
            Key::Interrupt => write!(f, "^C"),
            Key::Backspace => write!(f, "^H"),
            Key::Delete => write!(f, "[DELETE]"),
            Key::Up => write!(f, "up"),
            Key::Down => write!(f, "down"),
            Key::Left => write!(f, "left"),
            Key::Right => write!(f, "right"),
            Key::Char(c) => write!(f, "{}", c),
            Key::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Paced FIFO of packets with its rolling timer
#[derive(Debug, Clone)]
pub struct PacedQueue {
    packets: VecDeque<Packet>,
    timer: Instant,
}

impl PacedQueue {
    pub fn new(now: Instant) -> Self {
        Self {
            packets: VecDeque::new(),
            timer: now,
        }
    }

    pub fn push(&mut self, packet: Packet) {
        self.packets.push_back(packet);
    }

    /// Takes the front packet if its time has come
    ///
    /// An empty queue restarts the timer so idle time is never banked.
    pub fn take_ready(&mut self, now: Instant) -> Option<Packet> {
        let Some(front) = self.packets.front() else {
            self.timer = now;
            return None;
        };
        if now < front.ready_at(self.timer) {
            return None;
        }
        self.timer = now;
        self.packets.pop_front()
    }

    pub fn reset_timer(&mut self, now: Instant) {
        self.timer = now;
    }

    pub fn purge(&mut self) {
        self.packets.clear();
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

/// What one keystroke did to the line being edited
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Text to echo; the line changed or the cursor moved
    Echo(String),
    Submit,
    Interrupt,
    Ignore,
}

/// Line editing state
#[derive(Debug, Clone, Default)]
pub struct LineEditor {
    line: String,
    cursor: usize,
    secure: bool,
    strip: bool,
    cap: usize,
}

impl LineEditor {
    pub fn begin(&mut self, secure: bool, strip: bool, cap: usize) {
        self.line.clear();
        self.cursor = 0;
        self.secure = secure;
        self.strip = strip;
        self.cap = cap;
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn clear(&mut self) {
        self.line.clear();
        self.cursor = 0;
    }

    /// Applies one key; the line only ever holds printable ASCII
    pub fn apply(&mut self, key: &Key, interruptible: bool) -> Edit {
        match key {
            Key::Enter => {
                if self.strip {
                    self.line = self.line.trim().to_string();
                }
                Edit::Submit
            }
            Key::Interrupt if interruptible => Edit::Interrupt,
            Key::Backspace if self.cursor > 0 => {
                self.line.remove(self.cursor - 1);
                self.cursor -= 1;
                Edit::Echo("\x08 \x08".to_string())
            }
            Key::Delete if self.cursor < self.line.len() => {
                self.line.remove(self.cursor);
                Edit::Ignore
            }
            Key::Left if self.cursor > 0 => {
                self.cursor -= 1;
                Edit::Echo("\x1b[D".to_string())
            }
            Key::Right if self.cursor < self.line.len() => {
                self.cursor += 1;
                Edit::Echo("\x1b[C".to_string())
            }
            _ => match key.printable() {
                Some(c) if self.line.len() < self.cap => {
                    self.line.insert(self.cursor, c);
                    self.cursor += 1;
                    let echo = if self.secure { '*' } else { c };
                    Edit::Echo(echo.to_string())
                }
                _ => Edit::Ignore,
            },
        }
    }
}

/// Scroll position of an open pager
#[derive(Debug, Clone, Default)]
pub struct PagerState {
    pub lines: Vec<String>,
    pub pos: usize,
    pub rows: usize,
}

impl PagerState {
    pub fn new(lines: Vec<String>, rows: usize) -> Self {
        Self {
            lines,
            pos: 0,
            rows: rows.max(1),
        }
    }

    pub fn page(&self) -> &[String] {
        let end = (self.pos + self.rows).min(self.lines.len());
        &self.lines[self.pos..end]
    }

    pub fn scroll_up(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        if self.pos + self.rows < self.lines.len() {
            self.pos += 1;
        }
    }

    /// Share of the document shown so far, rounded down
    pub fn percent(&self) -> usize {
        if self.lines.is_empty() {
            return 100;
        }
        ((self.pos + self.rows).min(self.lines.len()) * 100) / self.lines.len()
    }
}

/// Output waiting for a terminal client, with its scrollback
#[derive(Debug, Clone)]
pub struct TerminalOutput {
    queue: PacedQueue,
    scrollback: String,
}

impl TerminalOutput {
    pub fn new(now: Instant) -> Self {
        Self {
            queue: PacedQueue::new(now),
            scrollback: String::new(),
        }
    }

    pub fn push(&mut self, packet: Packet) {
        self.queue.push(packet);
    }

    /// Releases at most one ready packet and records it in the scrollback
    pub fn poll(&mut self, now: Instant, height: u16) -> Option<String> {
        let packet = self.queue.take_ready(now)?;
        self.scrollback.push_str(&packet.payload);
        while self.scrollback.matches('\n').count() > height as usize {
            match self.scrollback.split_once('\n') {
                Some((_, rest)) => self.scrollback = rest.to_string(),
                None => break,
            }
        }
        Some(packet.payload)
    }

    /// Restarts print pacing, used when a client reattaches
    pub fn reset_timer(&mut self, now: Instant) {
        self.queue.reset_timer(now);
    }

    pub fn scrollback(&self) -> &str {
        &self.scrollback
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_aliases() {
        assert_eq!(Key::parse("\x1b[A"), Key::Up);
        assert_eq!(Key::parse("\x1b[D"), Key::Left);
        assert_eq!(Key::parse("abc\r\n"), Key::Enter);
        assert_eq!(Key::parse("\x03"), Key::Interrupt);
        assert_eq!(Key::parse("^C"), Key::Interrupt);
        assert_eq!(Key::parse("\x7f"), Key::Backspace);
        assert_eq!(Key::parse("q"), Key::Char('q'));
        assert_eq!(Key::parse("\x1b[Z"), Key::Other("\x1b[Z".to_string()));
        assert_eq!(Key::Up.to_string(), "up");
    }

    #[test]
    fn test_paced_queue_honors_delay() {
        let start = Instant::EPOCH;
        let mut queue = PacedQueue::new(start);
        queue.push(Packet::new("a").with_delay(Duration::from_millis(10)));
        assert!(queue.take_ready(start).is_none());
        assert!(queue
            .take_ready(start + Duration::from_millis(9))
            .is_none());
        let packet = queue.take_ready(start + Duration::from_millis(10)).unwrap();
        assert_eq!(packet.payload, "a");
    }

    #[test]
    fn test_paced_queue_lag_and_no_lag() {
        let start = Instant::EPOCH;
        let mut queue = PacedQueue::new(start);
        queue.push(Packet::new("x").with_lag(Some(Duration::from_millis(5))));
        queue.push(Packet::new("y").with_lag(None));
        assert!(queue.take_ready(start).is_none());
        let later = start + Duration::from_millis(5);
        assert_eq!(queue.take_ready(later).unwrap().payload, "x");
        assert_eq!(queue.take_ready(later).unwrap().payload, "y");
    }

    #[test]
    fn test_idle_queue_restarts_timer() {
        let mut queue = PacedQueue::new(Instant::EPOCH);
        let idle = Instant::EPOCH + Duration::from_secs(60);
        assert!(queue.take_ready(idle).is_none());
        queue.push(Packet::new("z").with_delay(Duration::from_secs(1)));
        assert!(queue.take_ready(idle).is_none());
        assert!(queue.take_ready(idle + Duration::from_secs(1)).is_some());
    }

    #[test]
    fn test_editor_typing_and_backspace() {
        let mut editor = LineEditor::default();
        editor.begin(false, true, 100);
        for c in "helo".chars() {
            editor.apply(&Key::Char(c), false);
        }
        assert_eq!(editor.apply(&Key::Backspace, false), Edit::Echo("\x08 \x08".into()));
        editor.apply(&Key::Char('l'), false);
        editor.apply(&Key::Char('o'), false);
        assert_eq!(editor.line(), "hello");
        assert_eq!(editor.apply(&Key::Enter, false), Edit::Submit);
    }

    #[test]
    fn test_editor_cursor_edits() {
        let mut editor = LineEditor::default();
        editor.begin(false, false, 100);
        for c in "abc".chars() {
            editor.apply(&Key::Char(c), false);
        }
        editor.apply(&Key::Left, false);
        editor.apply(&Key::Left, false);
        editor.apply(&Key::Delete, false);
        assert_eq!(editor.line(), "ac");
        editor.apply(&Key::Char('X'), false);
        assert_eq!(editor.line(), "aXc");
        assert_eq!(editor.cursor(), 2);
    }

    #[test]
    fn test_editor_secure_cap_and_interrupt() {
        let mut editor = LineEditor::default();
        editor.begin(true, true, 3);
        assert_eq!(editor.apply(&Key::Char('p'), false), Edit::Echo("*".into()));
        editor.apply(&Key::Char('w'), false);
        editor.apply(&Key::Char('d'), false);
        assert_eq!(editor.apply(&Key::Char('!'), false), Edit::Ignore);
        assert_eq!(editor.line(), "pwd");
        assert_eq!(editor.apply(&Key::Interrupt, false), Edit::Ignore);
        assert_eq!(editor.apply(&Key::Interrupt, true), Edit::Interrupt);
        assert_eq!(editor.apply(&Key::Char('\x01'), false), Edit::Ignore);
    }

    #[test]
    fn test_editor_strips_on_submit() {
        let mut editor = LineEditor::default();
        editor.begin(false, true, 100);
        for c in "  ls  ".chars() {
            editor.apply(&Key::Char(c), false);
        }
        editor.apply(&Key::Enter, false);
        assert_eq!(editor.line(), "ls");
    }

    #[test]
    fn test_pager_scrolling() {
        let lines: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let mut pager = PagerState::new(lines, 4);
        assert_eq!(pager.percent(), 40);
        pager.scroll_up();
        assert_eq!(pager.pos, 0);
        for _ in 0..10 {
            pager.scroll_down();
        }
        assert_eq!(pager.pos, 6);
        assert_eq!(pager.page().len(), 4);
        assert_eq!(pager.percent(), 100);
    }

    #[test]
    fn test_terminal_scrollback_trimmed() {
        let mut out = TerminalOutput::new(Instant::EPOCH);
        for i in 0..5 {
            out.push(Packet::new(format!("line{}\r\n", i)));
        }
        while out.poll(Instant::EPOCH, 2).is_some() {}
        assert_eq!(out.scrollback().matches('\n').count(), 2);
        assert!(out.scrollback().ends_with("line4\r\n"));
    }
}
