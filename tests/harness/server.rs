//! Real listener for socket-level tests.

use super::TestGateway;
use actix_web::{dev::ServerHandle, web, App, HttpServer};
use realtime_gateway::routes::chat::ChatService;
use realtime_gateway::routes::dispatcher::{dispatch_upgrade, UpgradeDispatcher};
use realtime_gateway::services::memory::InMemorySessionStore;
use realtime_gateway::services::{SessionAuthenticator, SessionRecord};
use realtime_gateway::websocket::session::TransportQueues;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

pub const COOKIE_NAME: &str = "connect.sid";
const SECRET: &str = "test-secret";

/// Serve `dispatcher` on an ephemeral port with a single worker.
pub async fn start_upgrade_server(
    dispatcher: UpgradeDispatcher,
) -> std::io::Result<(SocketAddr, ServerHandle)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let dispatcher = web::Data::new(dispatcher);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(dispatcher.clone())
            .default_service(web::to(dispatch_upgrade))
    })
    .workers(1)
    .listen(listener)?
    .run();

    let handle = server.handle();
    actix_rt::spawn(server);
    Ok((addr, handle))
}

/// Chat service over the gateway's hub, plus a signed cookie per session.
pub struct ChatEndpoint {
    pub dispatcher: UpgradeDispatcher,
    auth: SessionAuthenticator,
    sessions: Arc<InMemorySessionStore>,
}

impl ChatEndpoint {
    pub fn new(gateway: &TestGateway, queues: TransportQueues) -> Self {
        let sessions = Arc::new(InMemorySessionStore::new());
        let auth = SessionAuthenticator::new(COOKIE_NAME, &[SECRET.to_string()], sessions.clone());
        let mut dispatcher = UpgradeDispatcher::new();
        dispatcher
            .register(Arc::new(ChatService::new(
                "/ws/chat",
                auth.clone(),
                gateway.state.chat.clone(),
                queues,
            )))
            .expect("register chat service");
        Self {
            dispatcher,
            auth,
            sessions,
        }
    }

    /// Store a live session for `user_id` and return its `Cookie` header value.
    pub fn login(&self, session_id: &str, user_id: i64) -> String {
        self.sessions.insert(
            session_id,
            SessionRecord {
                user_id,
                expires_at: None,
            },
        );
        let signed = self.auth.sign(session_id).expect("sign session id");
        format!("{COOKIE_NAME}={signed}")
    }
}
