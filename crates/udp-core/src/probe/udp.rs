use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use super::{ProbeOutcome, StreamProbe};
use crate::address::StreamAddress;

/// Large enough for any UDP payload, so a datagram is never truncated.
const RECV_BUFFER_SIZE: usize = 65_536;

/// Probe backed by a real UDP socket.
///
/// Every attempt binds the stream's port with `SO_REUSEADDR`, joins the
/// group for multicast streams and optionally waits for one datagram.
///
/// Multicast sockets bind the group address itself (on unix), so the kernel
/// only delivers datagrams sent to that group even when other groups on the
/// same port are joined by concurrent checks. Unicast sockets bind the
/// wildcard address and accept a datagram from any sender; the configured
/// host is usually the receiving interface, not the source.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpProbe;

impl UdpProbe {
    pub fn new() -> Self {
        Self
    }
}

/// Local address for a probe socket.
fn bind_address(address: &StreamAddress) -> SocketAddr {
    if address.is_multicast && cfg!(unix) {
        return address.socket_addr();
    }
    match address.host {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), address.port),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), address.port),
    }
}

/// Socket held for the duration of one attempt. Dropping it leaves the
/// multicast group (if any) and closes the descriptor.
struct ProbeSocket {
    socket: UdpSocket,
    group: Option<IpAddr>,
    target: SocketAddr,
}

impl ProbeSocket {
    fn open(address: &StreamAddress) -> io::Result<Self> {
        let bind_addr = bind_address(address);

        let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&bind_addr.into())?;
        socket.set_nonblocking(true)?;
        debug!(stream = %address, %bind_addr, "Bound probe socket");

        let socket = UdpSocket::from_std(socket.into())?;
        Ok(Self {
            socket,
            group: None,
            target: address.socket_addr(),
        })
    }

    fn join(&mut self, group: IpAddr) -> io::Result<()> {
        match group {
            IpAddr::V4(g) => self.socket.join_multicast_v4(g, Ipv4Addr::UNSPECIFIED)?,
            IpAddr::V6(g) => self.socket.join_multicast_v6(&g, 0)?,
        }
        self.group = Some(group);
        debug!(stream = %self.target, %group, "Joined multicast group");
        Ok(())
    }

    async fn recv_one(&self, timeout: Duration) -> ProbeOutcome {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        debug!(stream = %self.target, timeout_ms = timeout.as_millis() as u64, "Waiting for data");

        match tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((bytes, from))) => {
                info!(stream = %self.target, bytes, %from, "Stream is active, data received");
                ProbeOutcome::DataReceived { bytes, from }
            }
            Ok(Err(e)) => {
                warn!(stream = %self.target, error = %e, "Receive failed");
                ProbeOutcome::BindFailed(e.to_string())
            }
            Err(_) => {
                warn!(
                    stream = %self.target,
                    timeout_ms = timeout.as_millis() as u64,
                    "Stream is inactive, no data within timeout"
                );
                ProbeOutcome::Timeout
            }
        }
    }
}

impl Drop for ProbeSocket {
    fn drop(&mut self) {
        let left = match self.group {
            Some(IpAddr::V4(g)) => self.socket.leave_multicast_v4(g, Ipv4Addr::UNSPECIFIED),
            Some(IpAddr::V6(g)) => self.socket.leave_multicast_v6(&g, 0),
            None => Ok(()),
        };
        if let Err(e) = left {
            debug!(stream = %self.target, error = %e, "Failed to leave multicast group");
        }
        debug!(stream = %self.target, "Closed probe socket");
    }
}

#[async_trait]
impl StreamProbe for UdpProbe {
    async fn probe(
        &self,
        address: &StreamAddress,
        timeout: Duration,
        require_data: bool,
    ) -> ProbeOutcome {
        debug!(stream = %address, multicast = address.is_multicast, "Checking stream");

        let mut socket = match ProbeSocket::open(address) {
            Ok(s) => s,
            Err(e) => {
                warn!(stream = %address, error = %e, "Failed to bind probe socket");
                return ProbeOutcome::BindFailed(e.to_string());
            }
        };

        if address.is_multicast {
            if let Err(e) = socket.join(address.host) {
                warn!(stream = %address, error = %e, "Failed to join multicast group");
                return ProbeOutcome::JoinFailed(e.to_string());
            }
        }

        if !require_data {
            info!(stream = %address, "Stream is reachable, bind succeeded");
            return ProbeOutcome::BoundNoData;
        }

        socket.recv_one(timeout).await
    }
}
