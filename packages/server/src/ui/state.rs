//! Shared application state and dependency wiring.

use std::sync::Arc;

use parole_shared::time::Clock;

use crate::{
    domain::{ConnectionRegistry, MessagePusher, RecordStore},
    infrastructure::message_pusher::WebSocketMessagePusher,
    usecase::{
        ActionDispatcher, AuthenticationHandler, ChatHandler, ConnectUseCase, DisconnectUseCase,
        FloorRequestCoordinator, MeetingLifecycleHandler,
    },
};

use super::server::ServerConfig;

/// Shared application state
pub struct AppState {
    /// ActionDispatcher（エンベロープの振り分け）
    pub dispatcher: Arc<ActionDispatcher>,
    /// Connection Registry（ライブ接続の管理）
    pub registry: Arc<ConnectionRegistry>,
    /// ConnectUseCase（接続のユースケース）
    pub connect_usecase: Arc<ConnectUseCase>,
    /// DisconnectUseCase（切断のユースケース）
    pub disconnect_usecase: Arc<DisconnectUseCase>,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    /// Capacity of each connection's inbound queue
    pub inbound_buffer: usize,
}

impl AppState {
    /// Wire the registry, broadcast router, coordinator and handlers around a record store.
    ///
    /// Dependencies are created in order:
    /// 1. Connection Registry
    /// 2. MessagePusher (broadcast router)
    /// 3. Floor-Request Coordinator
    /// 4. Action handlers and the dispatcher
    /// 5. Connect / disconnect use cases
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, config: &ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());

        let message_pusher: Arc<dyn MessagePusher> = Arc::new(WebSocketMessagePusher::new(
            registry.clone(),
            store.clone(),
            config.delivery_timeout,
        ));

        let coordinator = Arc::new(FloorRequestCoordinator::new(store.clone(), clock.clone()));

        let mut dispatcher = ActionDispatcher::new(registry.clone(), message_pusher.clone());
        dispatcher.register(Arc::new(AuthenticationHandler::new(
            store.clone(),
            registry.clone(),
        )));
        dispatcher.register(Arc::new(MeetingLifecycleHandler::new(
            store.clone(),
            registry.clone(),
            coordinator,
        )));
        dispatcher.register(Arc::new(ChatHandler::new(store.clone())));
        tracing::debug!("Registered handlers: {:?}", dispatcher.modeles());

        let connect_usecase = Arc::new(ConnectUseCase::new(
            registry.clone(),
            message_pusher,
            clock,
        ));
        let disconnect_usecase = Arc::new(DisconnectUseCase::new(registry.clone(), store));

        Self {
            dispatcher: Arc::new(dispatcher),
            registry,
            connect_usecase,
            disconnect_usecase,
            outbound_buffer: config.outbound_buffer.max(1),
            inbound_buffer: config.inbound_buffer.max(1),
        }
    }
}
