//! Background task that owns a [`CredentialVault`]
//!
//! Callers talk to the vault through a [`VaultHandle`]; the task serializes
//! commands and sleeps until the vault's next deadline so the encryption
//! debounce and the inactivity lock fire on their own.

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use vault_core::{KeyValueStore, VaultError, VaultResult};

use crate::guard::ActivityEvent;
use crate::vault::{CredentialVault, ShutdownSignal, TickOutcome, VaultStatus};

const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<T>;

/// Commands to send to the vault task.
#[derive(Debug)]
enum VaultCommand {
    SetSecret {
        value: String,
        reply: Reply<VaultResult<()>>,
    },
    SetPin {
        pin: String,
        reply: Reply<()>,
    },
    SetRemember {
        remember: bool,
        reply: Reply<VaultResult<()>>,
    },
    Unlock {
        pin: String,
        reply: Reply<VaultResult<()>>,
    },
    ResetPin {
        reply: Reply<VaultResult<()>>,
    },
    ClearAll {
        reply: Reply<VaultResult<()>>,
    },
    Lock {
        reply: Reply<bool>,
    },
    Activity(ActivityEvent),
    Secret {
        reply: Reply<Option<SecretString>>,
    },
    Status {
        reply: Reply<VaultStatus>,
    },
    Flush {
        reply: Reply<TickOutcome>,
    },
    /// Stop the task.
    Stop,
}

/// Client side of a running vault task
pub struct VaultHandle {
    cmd_tx: mpsc::Sender<VaultCommand>,
    status_rx: watch::Receiver<VaultStatus>,
    shutdown: ShutdownSignal,
    task: JoinHandle<()>,
}

/// Move a vault onto its own task.
///
/// The vault should read time from `SystemClock`; deadlines are slept on
/// with tokio's timer.
pub fn spawn_vault<S>(vault: CredentialVault<S>) -> VaultHandle
where
    S: KeyValueStore + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (status_tx, status_rx) = watch::channel(vault.status());
    let shutdown = vault.shutdown_signal();

    let task = tokio::spawn(run_vault(vault, cmd_rx, status_tx));

    VaultHandle {
        cmd_tx,
        status_rx,
        shutdown,
        task,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_vault<S: KeyValueStore>(
    mut vault: CredentialVault<S>,
    mut cmd_rx: mpsc::Receiver<VaultCommand>,
    status_tx: watch::Sender<VaultStatus>,
) {
    info!("Vault task started");

    loop {
        let deadline = vault.next_deadline();

        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None | Some(VaultCommand::Stop) => break,
                Some(cmd) => handle_command(&mut vault, cmd).await,
            },
            _ = sleep_until_deadline(deadline) => {
                let outcome = vault.tick().await;
                if outcome != TickOutcome::Idle {
                    debug!(?outcome, "Timer fired");
                }
            }
        }

        status_tx.send_replace(vault.status());
    }

    vault.shutdown();
    status_tx.send_replace(vault.status());
    info!("Vault task stopped");
}

async fn handle_command<S: KeyValueStore>(vault: &mut CredentialVault<S>, cmd: VaultCommand) {
    // A dropped reply receiver only means the caller stopped waiting
    match cmd {
        VaultCommand::SetSecret { value, reply } => {
            let _ = reply.send(vault.set_secret(value));
        }
        VaultCommand::SetPin { pin, reply } => {
            vault.set_pin(pin);
            let _ = reply.send(());
        }
        VaultCommand::SetRemember { remember, reply } => {
            let _ = reply.send(vault.set_remember(remember));
        }
        VaultCommand::Unlock { pin, reply } => {
            let _ = reply.send(vault.unlock(&pin).await);
        }
        VaultCommand::ResetPin { reply } => {
            let _ = reply.send(vault.reset_pin());
        }
        VaultCommand::ClearAll { reply } => {
            let _ = reply.send(vault.clear_all());
        }
        VaultCommand::Lock { reply } => {
            let _ = reply.send(vault.lock());
        }
        VaultCommand::Activity(event) => {
            vault.record_activity(event);
        }
        VaultCommand::Secret { reply } => {
            let secret = vault.secret().map(|s| SecretString::new(s.expose_secret().clone()));
            let _ = reply.send(secret);
        }
        VaultCommand::Status { reply } => {
            let _ = reply.send(vault.status());
        }
        VaultCommand::Flush { reply } => {
            let _ = reply.send(vault.flush().await);
        }
        VaultCommand::Stop => {}
    }
}

impl VaultHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> VaultCommand) -> VaultResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| VaultError::ServiceStopped)?;
        reply_rx.await.map_err(|_| VaultError::ServiceStopped)
    }

    pub async fn set_secret(&self, value: impl Into<String>) -> VaultResult<()> {
        let value = value.into();
        self.request(|reply| VaultCommand::SetSecret { value, reply })
            .await?
    }

    pub async fn set_pin(&self, pin: impl Into<String>) -> VaultResult<()> {
        let pin = pin.into();
        self.request(|reply| VaultCommand::SetPin { pin, reply }).await
    }

    pub async fn set_remember(&self, remember: bool) -> VaultResult<()> {
        self.request(|reply| VaultCommand::SetRemember { remember, reply })
            .await?
    }

    pub async fn unlock(&self, pin: impl Into<String>) -> VaultResult<()> {
        let pin = pin.into();
        self.request(|reply| VaultCommand::Unlock { pin, reply }).await?
    }

    pub async fn reset_pin(&self) -> VaultResult<()> {
        self.request(|reply| VaultCommand::ResetPin { reply }).await?
    }

    pub async fn clear_all(&self) -> VaultResult<()> {
        self.request(|reply| VaultCommand::ClearAll { reply }).await?
    }

    /// Lock now. False when there is no saved key to come back to.
    pub async fn lock(&self) -> VaultResult<bool> {
        self.request(|reply| VaultCommand::Lock { reply }).await
    }

    /// Report user activity. Does not wait for the task.
    pub async fn activity(&self, event: ActivityEvent) -> VaultResult<()> {
        self.cmd_tx
            .send(VaultCommand::Activity(event))
            .await
            .map_err(|_| VaultError::ServiceStopped)
    }

    /// Copy of the unlocked key, if any
    pub async fn secret(&self) -> VaultResult<Option<SecretString>> {
        self.request(|reply| VaultCommand::Secret { reply }).await
    }

    pub async fn status(&self) -> VaultResult<VaultStatus> {
        self.request(|reply| VaultCommand::Status { reply }).await
    }

    /// Write a pending debounced save now
    pub async fn flush(&self) -> VaultResult<TickOutcome> {
        self.request(|reply| VaultCommand::Flush { reply }).await
    }

    /// Status updates, published after every command and timer
    pub fn subscribe(&self) -> watch::Receiver<VaultStatus> {
        self.status_rx.clone()
    }

    /// Stop the task. A save still encrypting is not written.
    pub async fn shutdown(self) -> VaultResult<()> {
        self.shutdown.trigger();
        let _ = self.cmd_tx.send(VaultCommand::Stop).await;
        self.task.await?;
        Ok(())
    }
}
