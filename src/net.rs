//! Socket helpers: free-port allocation, local-IP discovery for the
//! discovery self-filter, and multicast socket construction.
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::time::Duration;

use anyhow::Result;
use socket2::{Domain, Protocol, Socket, Type};

pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 99);
const MULTICAST_TTL: u32 = 2;

/// Pick a random free TCP port by binding to port 0 and returning the
/// assigned port.
pub fn pick_free_port() -> Result<u16> {
    let sock = TcpListener::bind(("0.0.0.0", 0))?;
    let port = sock.local_addr()?.port();
    drop(sock);
    Ok(port)
}

/// Best-effort local IPv4 address, found via the UDP-connect trick (no
/// packet is actually sent; `connect` on a UDP socket just picks a route).
/// Falls back to loopback in an isolated sandbox with no outbound route.
pub fn local_ip() -> Ipv4Addr {
    (|| -> Result<Ipv4Addr> {
        let sock = UdpSocket::bind("0.0.0.0:0")?;
        sock.connect("1.1.1.1:80")?;
        match sock.local_addr()?.ip() {
            IpAddr::V4(v4) => Ok(v4),
            IpAddr::V6(_) => Ok(Ipv4Addr::LOCALHOST),
        }
    })()
    .unwrap_or(Ipv4Addr::LOCALHOST)
}

/// Build the multicast receive socket: joins `MULTICAST_GROUP` on
/// `INADDR_ANY`, bound to `0.0.0.0:<port>` with `SO_REUSEADDR` set so
/// multiple local processes (or fast restarts) can coexist.
pub fn multicast_receive_socket(port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
    socket.bind(&bind_addr.into())?;
    socket.join_multicast_v4(&MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_read_timeout(Some(Duration::from_millis(500)))?;
    Ok(socket.into())
}

/// Build the multicast send socket: TTL=2, ephemeral local port.
pub fn multicast_send_socket() -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
    let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, 0).into();
    socket.bind(&bind_addr.into())?;
    Ok(socket.into())
}
