//! Starting external programs.
//!
//! Every launch is described by a [`SpawnRequest`] and handed to a
//! [`ProcessSpawner`], so the orchestration can be exercised without
//! starting real programs.

use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};

use log::{debug, info, warn};

use crate::error::{LaunchError, LaunchResult};

/// A program to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Complete environment for the child; `None` inherits ours.
    pub env: Option<BTreeMap<String, String>>,
    /// Text written to the child's stdin.
    pub stdin: Option<String>,
    /// Block until the child exits, capturing its output.
    pub wait: bool,
}

impl SpawnRequest {
    /// A detached program that outlives the launcher.
    pub fn detached(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: None,
            stdin: None,
            wait: false,
        }
    }

    /// A short-lived helper the launcher waits for.
    pub fn waited(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            wait: true,
            ..Self::detached(program, args)
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Program and arguments joined for display.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Something that can start programs.
pub trait ProcessSpawner {
    fn spawn(&mut self, request: &SpawnRequest) -> LaunchResult<()>;
}

/// Spawner backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSpawner;

impl ProcessSpawner for OsSpawner {
    fn spawn(&mut self, request: &SpawnRequest) -> LaunchResult<()> {
        let spawn_err = |source: std::io::Error| LaunchError::Spawn {
            program: request.program.clone(),
            source,
        };

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);
        if let Some(env) = &request.env {
            cmd.env_clear().envs(env);
        }
        if request.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }
        if request.wait {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        debug!("[spawn] {}", request.command_line());
        let mut child = cmd.spawn().map_err(spawn_err)?;

        if let (Some(text), Some(mut stdin)) = (&request.stdin, child.stdin.take()) {
            stdin.write_all(text.as_bytes()).map_err(spawn_err)?;
        }

        if request.wait {
            let output = child.wait_with_output().map_err(spawn_err)?;
            if !output.status.success() {
                warn!(
                    "[spawn] {} exited with {}: {}",
                    request.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
        } else {
            info!("[spawn] Started {} (pid {})", request.program, child.id());
        }
        Ok(())
    }
}
