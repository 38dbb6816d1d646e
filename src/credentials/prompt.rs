//! Interactive secret entry

use super::{CredentialKey, Secret};
use crate::Result;
use crate::error::CredentialError;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::task::spawn_blocking;

/// Source of secrets that are not stored yet
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Obtain the secret for `key`
    async fn prompt(&self, key: &CredentialKey) -> Result<Secret>;
}

/// Asks on the controlling terminal with echo disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn prompt(&self, key: &CredentialKey) -> Result<Secret> {
        let message = format!("password for {}@{}: ", key.account, key.destination);

        // Reading stdin blocks; keep it off the runtime thread
        let answer = spawn_blocking(move || read_hidden_line(&message))
            .await
            .map_err(|e| CredentialError::PromptUnavailable {
                destination: key.destination.clone(),
                reason: format!("prompt task panicked: {}", e),
            })?;

        answer.map(Secret::new).map_err(|e| {
            CredentialError::PromptUnavailable {
                destination: key.destination.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Hands out pre-set answers in order; for provisioning scripts and tests
#[derive(Debug, Default)]
pub struct StaticPrompter {
    answers: Mutex<Vec<String>>,
    asked: Mutex<Vec<CredentialKey>>,
}

impl StaticPrompter {
    /// Create a prompter answering with `answers`, first to last
    pub fn new(answers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut answers: Vec<String> = answers.into_iter().map(Into::into).collect();
        answers.reverse();
        Self {
            answers: Mutex::new(answers),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Keys that were prompted for, in order
    pub fn asked(&self) -> Vec<CredentialKey> {
        self.asked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Prompter for StaticPrompter {
    async fn prompt(&self, key: &CredentialKey) -> Result<Secret> {
        self.asked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(key.clone());

        let answer = self
            .answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();

        answer.map(Secret::new).ok_or_else(|| {
            CredentialError::PromptUnavailable {
                destination: key.destination.clone(),
                reason: "no answer left".into(),
            }
            .into()
        })
    }
}

#[cfg(unix)]
fn read_hidden_line(message: &str) -> std::io::Result<String> {
    use std::io::{BufRead, Write};
    use std::os::unix::io::AsRawFd;

    let stdin = std::io::stdin();
    let fd = stdin.as_raw_fd();

    // SAFETY: termios is plain data; tcgetattr fills it or fails (e.g. not a TTY)
    let mut term: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut term) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    let original = term;
    term.c_lflag &= !libc::ECHO;
    term.c_lflag |= libc::ECHONL;

    let mut stderr = std::io::stderr();
    write!(stderr, "{}", message)?;
    stderr.flush()?;

    // SAFETY: `term` was initialised by tcgetattr above
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &term) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let mut line = String::new();
    let read = stdin.lock().read_line(&mut line);

    // SAFETY: restores the settings captured before echo was disabled
    unsafe {
        libc::tcsetattr(fd, libc::TCSANOW, &original);
    }

    read?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

#[cfg(not(unix))]
fn read_hidden_line(_message: &str) -> std::io::Result<String> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "hidden terminal input is only supported on Unix",
    ))
}
