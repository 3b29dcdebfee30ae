//! Scripted Command Channel
//!
//! Hardware-free [`CommandChannel`] answering from a command → response
//! script. Used by tests throughout the workspace and for bench runs without
//! an adapter.

use crate::channel::CommandChannel;
use crate::error::ObdError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

type Reply = Result<String, ObdError>;

#[derive(Default)]
struct Script {
    /// One-shot replies, consumed before the standing reply
    queued: HashMap<String, VecDeque<Reply>>,
    /// Standing replies
    standing: HashMap<String, Reply>,
    /// Commands in the order they were sent
    log: Vec<String>,
}

/// Command channel driven by a response script
pub struct ScriptedChannel {
    script: Mutex<Script>,
    default_reply: String,
    open: AtomicBool,
}

impl ScriptedChannel {
    /// Create an open channel answering `OK` to anything unscripted
    pub fn new() -> Self {
        Self::with_default_reply("OK")
    }

    /// Create an open channel with a custom reply for unscripted commands
    pub fn with_default_reply(reply: &str) -> Self {
        Self {
            script: Mutex::new(Script::default()),
            default_reply: reply.to_string(),
            open: AtomicBool::new(true),
        }
    }

    /// Channel preloaded with the answers of a healthy ELM327 on an 11-bit
    /// CAN engine ECU that accepts the extended diagnostic session
    pub fn elm327() -> Self {
        let channel = Self::new();
        channel.respond("ATZ", "ELM327 v1.5");
        channel.respond("ATI", "ELM327 v1.5");
        channel.respond("ATRV", "12.6V");
        channel.respond("ATDPN", "6");
        channel.respond("0100", "SEARCHING...\r41 00 BE 3E B8 11");
        channel.respond("1003", "50 03 00 32 01 F4");
        channel
    }

    /// Answer `command` with `response` every time
    pub fn respond(&self, command: &str, response: &str) {
        self.lock()
            .standing
            .insert(command.to_string(), Ok(response.to_string()));
    }

    /// Answer the next `command` with `response`, then fall back to the standing reply
    pub fn respond_once(&self, command: &str, response: &str) {
        self.lock()
            .queued
            .entry(command.to_string())
            .or_default()
            .push_back(Ok(response.to_string()));
    }

    /// Fail `command` with `error` every time
    pub fn fail(&self, command: &str, error: ObdError) {
        self.lock().standing.insert(command.to_string(), Err(error));
    }

    /// Fail the next `command` with `error`
    pub fn fail_once(&self, command: &str, error: ObdError) {
        self.lock()
            .queued
            .entry(command.to_string())
            .or_default()
            .push_back(Err(error));
    }

    /// Simulate the link going up or down
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// Commands received so far, oldest first
    pub fn sent(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Number of times `command` was received
    pub fn count(&self, command: &str) -> usize {
        self.lock().log.iter().filter(|c| *c == command).count()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ScriptedChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandChannel for ScriptedChannel {
    async fn send_command(&self, command: &str) -> Result<String, ObdError> {
        if !self.is_open() {
            return Err(ObdError::NotConnected);
        }

        let mut script = self.lock();
        script.log.push(command.to_string());

        let reply = match script.queued.get_mut(command).and_then(VecDeque::pop_front) {
            Some(reply) => reply,
            None => script
                .standing
                .get(command)
                .cloned()
                .unwrap_or_else(|| Ok(self.default_reply.clone())),
        };
        debug!("scripted {} -> {:?}", command, reply);

        // Frame the way a real adapter does
        reply.map(|text| format!("{text}\r\r>"))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
