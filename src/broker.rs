//! Command broker event loop.
//!
//! One task owns the endpoint, the session, and the capability provider,
//! and alternates between a timed receive and running a command handler to
//! completion. The timeout keeps the loop responsive to the shutdown flag
//! without busy-waiting; handlers (including the multi-second association
//! sequence) are never preempted, so at most one provider operation is in
//! flight at any time.
//!
//! Lifecycle:
//! 1. Receive a datagram (bounded wait; on timeout, re-check shutdown)
//! 2. Decode ([`Command::decode`]); malformed or unknown input is logged
//!    and dropped without a reply
//! 3. Validate against the session state
//! 4. Drive the provider, reply to the captured sender address

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::{Command, ConnectRequest, Response, Status, FRAME_SIZE};
use crate::session::Session;
use crate::transport::{Endpoint, PeerAddr};
use crate::wifi::{TargetMatcher, WifiError, WifiProvider};

/// Receive timeout bounding each loop iteration.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Link verification: how often and how long to poll after association.
const LINK_VERIFY_ATTEMPTS: u32 = 10;
const LINK_VERIFY_INTERVAL: Duration = Duration::from_millis(500);

/// The command broker: datagram endpoint, session, capability provider.
///
/// Generic over the provider so tests can script one; the binary plugs in
/// [`crate::wifi::NmcliProvider`].
pub struct Broker<P> {
    endpoint: Endpoint,
    provider: P,
    session: Session,
    discovery: TargetMatcher,
    shutdown: Arc<AtomicBool>,
    recv_timeout: Duration,
}

impl<P: WifiProvider> Broker<P> {
    /// Build a broker around an already-bound endpoint and an initialized
    /// provider.
    pub fn new(
        endpoint: Endpoint,
        provider: P,
        discovery: TargetMatcher,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            endpoint,
            provider,
            session: Session::new(),
            discovery,
            shutdown,
            recv_timeout: RECV_TIMEOUT,
        }
    }

    /// Override the receive timeout (tests use a short one).
    pub fn with_recv_timeout(mut self, recv_timeout: Duration) -> Self {
        self.recv_timeout = recv_timeout;
        self
    }

    /// The session record.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run the receive/dispatch/reply cycle until quit or shutdown signal.
    pub async fn run(&mut self) -> Result<()> {
        info!(endpoint = %self.endpoint.describe(), "command broker listening");

        let mut buf = BytesMut::zeroed(FRAME_SIZE + 1);
        loop {
            if self.shutdown.load(Ordering::SeqCst) || self.session.is_shutting_down() {
                break;
            }

            match timeout(self.recv_timeout, self.endpoint.recv_from(&mut buf)).await {
                // Timed out: loop around and re-check the shutdown flag.
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!(error = %e, "receive failed");
                    continue;
                }
                Ok(Ok((len, peer))) => {
                    let frame = buf[..len].to_vec();
                    self.handle_datagram(&frame, &peer).await;
                }
            }
        }

        info!("command loop stopped");
        Ok(())
    }

    /// Release the endpoint and the provider, in that order.
    pub async fn shutdown(self) {
        let Broker {
            endpoint,
            mut provider,
            ..
        } = self;
        drop(endpoint);
        provider.cleanup().await;
    }

    /// Decode one datagram and dispatch it.
    async fn handle_datagram(&mut self, frame: &[u8], peer: &PeerAddr) {
        let command = match Command::decode(frame) {
            Ok(command) => command,
            // Dropped without a reply so the broker cannot be used to
            // reflect traffic at third parties.
            Err(e) => {
                debug!(peer = %peer, error = %e, "dropping datagram");
                return;
            }
        };

        if self.session.is_shutting_down() {
            debug!(peer = %peer, "ignoring command while shutting down");
            return;
        }

        debug!(
            peer = %peer,
            code = format_args!("{:#04x}", command.control_code()),
            "received command"
        );

        match command {
            Command::Sync => {
                let response = self.handle_sync().await;
                self.send(response, peer).await;
            }
            Command::Connect(request) => self.handle_connect(request, peer).await,
            Command::Unbind => {
                let response = self.handle_unbind().await;
                self.send(response, peer).await;
            }
            Command::Quit => {
                info!("quit received");
                self.session.begin_shutdown();
            }
        }
    }

    /// `SYNC`: scan for the target device's network. Does not associate.
    async fn handle_sync(&mut self) -> Response {
        if let Err(e) = self.session.begin_scan() {
            warn!(error = %e, "sync rejected");
            return Response::Status(Status::ErrInvalidState);
        }

        match self.provider.scan_for_target(&self.discovery).await {
            Ok(network) => {
                info!(ssid = %network.ssid, "target network in range");
                self.session.scan_succeeded();
                Response::Status(Status::Success)
            }
            Err(e) => {
                // A miss and a provider failure look the same on the wire.
                warn!(error = %e, "target scan failed");
                self.session.scan_failed();
                Response::Status(Status::ErrGeneric)
            }
        }
    }

    /// `CONNECT`: acknowledge, then run the full association sequence.
    ///
    /// The acknowledgment goes out before the (potentially slow) sequence
    /// because association can outlast the frontend's retry timeout; the
    /// outcome follows as an unsolicited status frame.
    async fn handle_connect(&mut self, request: ConnectRequest, peer: &PeerAddr) {
        if let Err(e) = self.session.connect_allowed() {
            warn!(error = %e, "connect rejected");
            self.send(Response::Status(Status::ErrInvalidState), peer).await;
            return;
        }

        self.send(Response::BindAck, peer).await;

        let ssid = request.ssid.clone();
        match self.associate_sequence(&request).await {
            Ok(address) => {
                info!(ssid = %ssid, address = %address, "associated");
                self.session.mark_associated(ssid);
                self.send(Response::Status(Status::Success), peer).await;
            }
            Err(e) => {
                warn!(ssid = %ssid, error = %e, "association failed");
                // Never leave the provider half-associated.
                if let Err(e) = self.provider.disassociate().await {
                    warn!(error = %e, "cleanup disassociate failed");
                }
                self.session.force_idle();
                let status = match e {
                    WifiError::NotFound => Status::ErrNotFound,
                    _ => Status::ErrGeneric,
                };
                self.send(Response::Status(status), peer).await;
            }
        }
    }

    /// Scan for the named network, associate, wait for the link, query the
    /// address.
    async fn associate_sequence(&mut self, request: &ConnectRequest) -> std::result::Result<String, WifiError> {
        let matcher = TargetMatcher::Exact(request.ssid.clone());
        let network = self.provider.scan_for_target(&matcher).await?;

        // A frontend-pinned BSSID wins over the scanned one.
        let bssid = request.bssid.or(network.bssid);
        self.provider
            .associate(&request.ssid, bssid.as_ref(), &request.psk)
            .await?;

        for _ in 0..LINK_VERIFY_ATTEMPTS {
            if self.provider.is_connected().await {
                return self.provider.get_ip_address().await;
            }
            tokio::time::sleep(LINK_VERIFY_INTERVAL).await;
        }
        Err(WifiError::AssociationFailed(
            "link did not come up".to_string(),
        ))
    }

    /// `UNBIND`: always disassociate, always settle in idle. Idempotent.
    async fn handle_unbind(&mut self) -> Response {
        let result = self.provider.disassociate().await;
        self.session.force_idle();
        match result {
            Ok(()) => Response::Status(Status::Success),
            Err(e) => {
                warn!(error = %e, "disassociate failed");
                Response::Status(Status::ErrGeneric)
            }
        }
    }

    /// Reply to the sender; per-packet send failures are logged, never
    /// fatal.
    async fn send(&self, response: Response, peer: &PeerAddr) {
        let frame = response.encode();
        if let Err(e) = self.endpoint.send_to(&frame, peer).await {
            warn!(peer = %peer, error = %e, "reply failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::wifi::NetworkId;
    use async_trait::async_trait;
    use std::net::SocketAddr;

    /// Provider scripted per call; records the calls it receives.
    #[derive(Default)]
    struct ScriptedWifi {
        scan_result: Option<std::result::Result<NetworkId, WifiError>>,
        associate_ok: bool,
        calls: Vec<&'static str>,
    }

    #[async_trait]
    impl WifiProvider for ScriptedWifi {
        async fn init(&mut self, _interface: Option<&str>) -> std::result::Result<(), WifiError> {
            self.calls.push("init");
            Ok(())
        }

        async fn scan_for_target(
            &mut self,
            _matcher: &TargetMatcher,
        ) -> std::result::Result<NetworkId, WifiError> {
            self.calls.push("scan");
            self.scan_result.take().unwrap_or(Err(WifiError::NotFound))
        }

        async fn associate(
            &mut self,
            _ssid: &str,
            _bssid: Option<&crate::wifi::MacAddr>,
            _psk: &[u8],
        ) -> std::result::Result<(), WifiError> {
            self.calls.push("associate");
            if self.associate_ok {
                Ok(())
            } else {
                Err(WifiError::AssociationFailed("scripted".to_string()))
            }
        }

        async fn disassociate(&mut self) -> std::result::Result<(), WifiError> {
            self.calls.push("disassociate");
            Ok(())
        }

        async fn is_connected(&mut self) -> bool {
            self.calls.push("is_connected");
            true
        }

        async fn get_ip_address(&mut self) -> std::result::Result<String, WifiError> {
            self.calls.push("get_ip_address");
            Ok("192.168.1.57".to_string())
        }

        async fn cleanup(&mut self) {
            self.calls.push("cleanup");
        }
    }

    async fn test_broker(provider: ScriptedWifi) -> Broker<ScriptedWifi> {
        let endpoint = Endpoint::bind_udp(0).await.unwrap();
        Broker::new(
            endpoint,
            provider,
            TargetMatcher::Prefix("AirwireAP".to_string()),
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn throwaway_peer() -> PeerAddr {
        PeerAddr::Inet(SocketAddr::from(([127, 0, 0, 1], 1)))
    }

    #[tokio::test]
    async fn test_commands_ignored_while_shutting_down() {
        let mut broker = test_broker(ScriptedWifi::default()).await;
        broker.session.begin_shutdown();

        let frame = Command::Sync.encode();
        broker.handle_datagram(&frame, &throwaway_peer()).await;

        assert!(broker.provider.calls.is_empty(), "no provider call allowed");
    }

    #[tokio::test]
    async fn test_malformed_datagram_touches_nothing() {
        let mut broker = test_broker(ScriptedWifi::default()).await;
        broker.handle_datagram(&[0u8; 8], &throwaway_peer()).await;

        assert!(broker.provider.calls.is_empty());
        assert_eq!(broker.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_sync_scan_miss_is_generic_error() {
        let mut broker = test_broker(ScriptedWifi {
            scan_result: Some(Err(WifiError::NotFound)),
            ..Default::default()
        })
        .await;

        let response = broker.handle_sync().await;
        assert_eq!(response, Response::Status(Status::ErrGeneric));
        assert_eq!(broker.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_sync_scan_hit_is_success() {
        let mut broker = test_broker(ScriptedWifi {
            scan_result: Some(Ok(NetworkId {
                ssid: "AirwireAP-7f21".to_string(),
                bssid: None,
            })),
            ..Default::default()
        })
        .await;

        let response = broker.handle_sync().await;
        assert_eq!(response, Response::Status(Status::Success));
        assert_eq!(broker.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_connect_failure_disassociates_and_idles() {
        let mut broker = test_broker(ScriptedWifi {
            scan_result: Some(Ok(NetworkId {
                ssid: "AirwireAP-7f21".to_string(),
                bssid: None,
            })),
            associate_ok: false,
            ..Default::default()
        })
        .await;

        let request = ConnectRequest::new("AirwireAP-7f21", None, b"secret".to_vec()).unwrap();
        broker.handle_connect(request, &throwaway_peer()).await;

        assert!(broker.provider.calls.contains(&"disassociate"));
        assert_eq!(broker.session.state(), SessionState::Idle);
        assert_eq!(broker.session.current_network(), None);
    }

    #[tokio::test]
    async fn test_connect_success_marks_associated() {
        let mut broker = test_broker(ScriptedWifi {
            scan_result: Some(Ok(NetworkId {
                ssid: "AirwireAP-7f21".to_string(),
                bssid: None,
            })),
            associate_ok: true,
            ..Default::default()
        })
        .await;

        let request = ConnectRequest::new("AirwireAP-7f21", None, b"secret".to_vec()).unwrap();
        broker.handle_connect(request, &throwaway_peer()).await;

        assert_eq!(broker.session.state(), SessionState::Associated);
        assert_eq!(broker.session.current_network(), Some("AirwireAP-7f21"));
    }

    #[tokio::test]
    async fn test_connect_rejected_while_associated() {
        let mut broker = test_broker(ScriptedWifi::default()).await;
        broker.session.mark_associated("AirwireAP-1");

        let request = ConnectRequest::new("AirwireAP-2", None, Vec::new()).unwrap();
        broker.handle_connect(request, &throwaway_peer()).await;

        // Rejected before any provider call.
        assert!(broker.provider.calls.is_empty());
        assert_eq!(broker.session.current_network(), Some("AirwireAP-1"));
    }

    #[tokio::test]
    async fn test_unbind_idempotent() {
        let mut broker = test_broker(ScriptedWifi::default()).await;
        broker.session.mark_associated("AirwireAP-1");

        assert_eq!(
            broker.handle_unbind().await,
            Response::Status(Status::Success)
        );
        assert_eq!(broker.session.state(), SessionState::Idle);

        assert_eq!(
            broker.handle_unbind().await,
            Response::Status(Status::Success)
        );
        assert_eq!(broker.session.state(), SessionState::Idle);
        assert_eq!(
            broker.provider.calls,
            vec!["disassociate", "disassociate"],
            "unbind always reaches the provider"
        );
    }

    #[tokio::test]
    async fn test_quit_enters_shutdown() {
        let mut broker = test_broker(ScriptedWifi::default()).await;
        let frame = Command::Quit.encode();
        broker.handle_datagram(&frame, &throwaway_peer()).await;

        assert!(broker.session.is_shutting_down());
        assert!(broker.provider.calls.is_empty());
    }
}
