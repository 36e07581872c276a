//! Gateway Manager for the platform gateway.
//!
//! The Gateway Manager provides a unified interface for:
//! - Registering and starting gateways
//! - Routing gateway events to the [`MessageHandler`]
//! - Sending commands and awaiting their results by request id
//! - Managing gateway lifecycle (start, stop)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use marketboard_gateway_protocol::{
    ButtonPressedData, GatewayCommand, GatewayEvent, InlineKeyboard, MessageReceivedData,
};

/// Default time to wait for a gateway to answer a command.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Command results waiting for their `CommandOk`/`CommandError`, by request id.
type PendingRequests = DashMap<String, oneshot::Sender<Result<Option<String>, SendError>>>;

// ============================================================================
// Gateway Manager
// ============================================================================

/// Manager for gateway plugins. Cheap to clone.
#[derive(Clone)]
pub struct GatewayManager {
    inner: Arc<RwLock<GatewayManagerInner>>,
    pending: Arc<PendingRequests>,
}

struct GatewayManagerInner {
    /// Registered gateways by name.
    gateways: HashMap<String, GatewayHandle>,

    /// Handler for incoming events.
    handler: Option<Arc<dyn MessageHandler>>,

    /// How long [`GatewayManager::request`] waits for a result.
    request_timeout: Duration,

    /// JoinHandles for event handler tasks, awaited at shutdown.
    event_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl GatewayManager {
    /// Create a new gateway manager with the given command timeout.
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(GatewayManagerInner {
                gateways: HashMap::new(),
                handler: None,
                request_timeout,
                event_handles: Vec::new(),
            })),
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Set the handler for incoming gateway events.
    pub async fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        let mut inner = self.inner.write().await;
        inner.handler = Some(handler);
    }

    /// Register a gateway and get channels for communication.
    ///
    /// Returns:
    /// - `Receiver<GatewayCommand>`: Gateway receives commands from the core
    /// - `Sender<GatewayEvent>`: Gateway sends events to the core
    pub async fn register(
        &self,
        name: impl Into<String>,
        capabilities: Vec<String>,
    ) -> (mpsc::Receiver<GatewayCommand>, mpsc::Sender<GatewayEvent>) {
        let name = name.into();
        let (cmd_tx, cmd_rx) = mpsc::channel(100);
        let (evt_tx, evt_rx) = mpsc::channel(100);

        let handle = GatewayHandle {
            name: name.clone(),
            command_tx: cmd_tx,
            capabilities,
        };

        {
            let mut inner = self.inner.write().await;
            inner.gateways.insert(name.clone(), handle);
        }

        let manager = self.clone();
        let gateway_name = name.clone();
        let join_handle = tokio::spawn(async move {
            manager.handle_events(gateway_name, evt_rx).await;
        });

        {
            let mut inner = self.inner.write().await;
            inner.event_handles.push(join_handle);
        }

        info!(gateway = %name, "Gateway registered");
        (cmd_rx, evt_tx)
    }

    /// Unregister a gateway.
    pub async fn unregister(&self, name: &str) {
        let mut inner = self.inner.write().await;
        if inner.gateways.remove(name).is_some() {
            info!(gateway = %name, "Gateway unregistered");
        }
    }

    /// Get a gateway handle by name.
    pub async fn get(&self, name: &str) -> Option<GatewayHandle> {
        let inner = self.inner.read().await;
        inner.gateways.get(name).cloned()
    }

    /// List all registered gateways.
    pub async fn list(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.gateways.keys().cloned().collect()
    }

    /// Send a command built around a fresh request id and wait for its result.
    ///
    /// Resolves to the resource id reported by `CommandOk`, if any.
    pub async fn request(
        &self,
        gateway: &str,
        build: impl FnOnce(String) -> GatewayCommand,
    ) -> Result<Option<String>, SendError> {
        let (tx, timeout) = {
            let inner = self.inner.read().await;
            let tx = inner.gateways.get(gateway).map(|h| h.command_tx.clone());
            (tx, inner.request_timeout)
        };
        let Some(tx) = tx else {
            return Err(SendError::NotRegistered(gateway.to_string()));
        };

        let request_id = ulid::Ulid::new().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), reply_tx);

        if tx.send(build(request_id.clone())).await.is_err() {
            self.pending.remove(&request_id);
            return Err(SendError::ChannelClosed);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SendError::ChannelClosed),
            Err(_elapsed) => {
                self.pending.remove(&request_id);
                warn!(gateway = %gateway, request_id = %request_id, "Gateway request timed out");
                Err(SendError::Timeout(timeout))
            }
        }
    }

    /// Send a message without waiting for the gateway's result.
    pub async fn send_message_with_keyboard(
        &self,
        gateway: &str,
        chat_id: &str,
        content: &str,
        inline_keyboard: Option<InlineKeyboard>,
    ) -> Result<(), SendError> {
        let command = GatewayCommand::SendMessage {
            request_id: ulid::Ulid::new().to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            inline_keyboard,
        };
        self.send(gateway, command).await
    }

    /// Answer a button press with an optional ephemeral text.
    pub async fn answer_button(
        &self,
        gateway: &str,
        interaction_id: &str,
        text: Option<String>,
    ) -> Result<(), SendError> {
        let command = GatewayCommand::AnswerButton {
            request_id: ulid::Ulid::new().to_string(),
            interaction_id: interaction_id.to_string(),
            text,
        };
        self.send(gateway, command).await
    }

    async fn send(&self, gateway: &str, command: GatewayCommand) -> Result<(), SendError> {
        let handle = {
            let inner = self.inner.read().await;
            inner.gateways.get(gateway).map(|h| h.command_tx.clone())
        };

        let Some(tx) = handle else {
            warn!(gateway = %gateway, "Gateway not found");
            return Err(SendError::NotRegistered(gateway.to_string()));
        };

        tx.send(command).await.map_err(|_| SendError::ChannelClosed)
    }

    /// Shutdown all gateways gracefully.
    pub async fn shutdown(&self) {
        let gateways = {
            let inner = self.inner.read().await;
            inner
                .gateways
                .iter()
                .map(|(k, v)| (k.clone(), v.command_tx.clone()))
                .collect::<Vec<_>>()
        };

        for (name, tx) in gateways {
            debug!(gateway = %name, "Sending shutdown to gateway");
            let _ = tx.send(GatewayCommand::Shutdown).await;
        }

        // Wait for event handler tasks to finish
        let handles = {
            let mut inner = self.inner.write().await;
            std::mem::take(&mut inner.event_handles)
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Complete a pending request. Results for fire-and-forget commands have
    /// no waiter and are only logged.
    fn resolve(&self, gateway: &str, request_id: &str, result: Result<Option<String>, SendError>) {
        match self.pending.remove(request_id) {
            Some((_, waiter)) => {
                let _ = waiter.send(result);
            }
            None => match result {
                Ok(resource_id) => debug!(
                    gateway = %gateway,
                    request_id = %request_id,
                    resource_id = ?resource_id,
                    "Command completed"
                ),
                Err(e) => error!(
                    gateway = %gateway,
                    request_id = %request_id,
                    error = %e,
                    "Command failed"
                ),
            },
        }
    }

    /// Handle events from a gateway.
    ///
    /// Chat messages and channel deletions are handled inline so that the
    /// session store sees them in delivery order. Button presses and the
    /// ready hook await gateway results and run as concurrent tasks.
    async fn handle_events(&self, gateway: String, mut rx: mpsc::Receiver<GatewayEvent>) {
        let mut inflight = tokio::task::JoinSet::new();

        while let Some(event) = rx.recv().await {
            // Reap completed handler tasks
            while inflight.try_join_next().is_some() {}

            match event {
                GatewayEvent::Ready {
                    gateway: gw_name,
                    version,
                    capabilities,
                } => {
                    info!(
                        gateway = %gateway,
                        reported_name = %gw_name,
                        version = %version,
                        capabilities = ?capabilities,
                        "Gateway ready"
                    );

                    if let Some(handler) = self.handler().await {
                        let gateway = gateway.clone();
                        inflight.spawn(async move {
                            handler.handle_ready(&gateway).await;
                        });
                    }
                }

                GatewayEvent::MessageReceived(data) => {
                    debug!(
                        gateway = %gateway,
                        message_id = %data.message_id,
                        chat_id = %data.chat_id,
                        sender_id = %data.sender.id,
                        "Message received from gateway"
                    );

                    let Some(handler) = self.handler().await else {
                        warn!(gateway = %gateway, "No message handler registered");
                        continue;
                    };

                    if let Some(reply) = handler.handle_message(&gateway, &data)
                        && let Err(e) = self
                            .send_message_with_keyboard(
                                &gateway,
                                &data.chat_id,
                                &reply.content,
                                reply.inline_keyboard,
                            )
                            .await
                    {
                        error!(
                            gateway = %gateway,
                            chat_id = %data.chat_id,
                            error = %e,
                            "Failed to send reply"
                        );
                    }
                }

                GatewayEvent::ButtonPressed(data) => {
                    debug!(
                        gateway = %gateway,
                        interaction_id = %data.interaction_id,
                        chat_id = %data.chat_id,
                        data = %data.data,
                        "Button pressed"
                    );

                    let Some(handler) = self.handler().await else {
                        warn!(gateway = %gateway, "No message handler registered");
                        continue;
                    };

                    let manager = self.clone();
                    let gateway = gateway.clone();
                    inflight.spawn(async move {
                        let answer = handler.handle_button(&gateway, &data).await;
                        if let Err(e) = manager
                            .answer_button(&gateway, &data.interaction_id, answer)
                            .await
                        {
                            warn!(
                                gateway = %gateway,
                                interaction_id = %data.interaction_id,
                                error = %e,
                                "Failed to answer button"
                            );
                        }
                    });
                }

                GatewayEvent::ChatDeleted { chat_id } => {
                    debug!(gateway = %gateway, chat_id = %chat_id, "Chat deleted");
                    if let Some(handler) = self.handler().await {
                        handler.handle_chat_deleted(&gateway, &chat_id);
                    }
                }

                GatewayEvent::CommandOk {
                    request_id,
                    resource_id,
                } => {
                    self.resolve(&gateway, &request_id, Ok(resource_id));
                }

                GatewayEvent::CommandError {
                    request_id,
                    code,
                    message,
                } => {
                    self.resolve(&gateway, &request_id, Err(SendError::Command { code, message }));
                }

                GatewayEvent::Error {
                    code,
                    message,
                    fatal,
                } => {
                    if fatal {
                        error!(
                            gateway = %gateway,
                            code = %code,
                            message = %message,
                            "Fatal gateway error"
                        );
                        self.unregister(&gateway).await;
                    } else {
                        warn!(
                            gateway = %gateway,
                            code = %code,
                            message = %message,
                            "Gateway error"
                        );
                    }
                }

                GatewayEvent::Shutdown { reason } => {
                    info!(gateway = %gateway, reason = %reason, "Gateway shutdown");
                    self.unregister(&gateway).await;
                    break;
                }
            }
        }

        // Wait for in-flight handlers to complete
        while inflight.join_next().await.is_some() {}

        debug!(gateway = %gateway, "Gateway event handler stopped");
    }

    async fn handler(&self) -> Option<Arc<dyn MessageHandler>> {
        self.inner.read().await.handler.clone()
    }
}

impl Default for GatewayManager {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

// ============================================================================
// Message Handler
// ============================================================================

/// Text sent back into the chat a message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub inline_keyboard: Option<InlineKeyboard>,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            inline_keyboard: None,
        }
    }

    pub fn with_keyboard(content: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            content: content.into(),
            inline_keyboard: Some(keyboard),
        }
    }
}

/// Handler for incoming gateway events.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Called when the gateway reports it is connected.
    async fn handle_ready(&self, _gateway: &str) {}

    /// Handle an incoming chat message.
    ///
    /// Runs inline in delivery order, so it must not wait on gateway results.
    /// The returned reply is sent back to the message's chat.
    fn handle_message(&self, gateway: &str, data: &MessageReceivedData) -> Option<Reply>;

    /// Handle a button press.
    ///
    /// Returns an optional ephemeral text for the member who pressed it.
    async fn handle_button(&self, gateway: &str, data: &ButtonPressedData) -> Option<String>;

    /// A chat was deleted on the platform.
    fn handle_chat_deleted(&self, _gateway: &str, _chat_id: &str) {}
}

// ============================================================================
// Gateway Handle
// ============================================================================

/// Handle for communicating with a gateway.
#[derive(Clone)]
pub struct GatewayHandle {
    /// Gateway name (e.g., "discord").
    pub name: String,

    /// Channel to send commands to the gateway.
    pub command_tx: mpsc::Sender<GatewayCommand>,

    /// Capabilities reported by the gateway.
    pub capabilities: Vec<String>,
}

impl GatewayHandle {
    /// Send a command to the gateway.
    pub async fn send(&self, command: GatewayCommand) -> Result<(), SendError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Check if the gateway supports a capability.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// Error sending a command to a gateway.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    #[error("gateway channel closed")]
    ChannelClosed,

    #[error("gateway '{0}' is not registered")]
    NotRegistered(String),

    #[error("gateway did not answer within {0:?}")]
    Timeout(Duration),

    #[error("gateway command failed ({code}): {message}")]
    Command { code: String, message: String },
}
