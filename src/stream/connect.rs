use std::io;
use std::net::{IpAddr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};

use tokio::net::{TcpSocket, TcpStream};

use crate::config::{self, AddressFamily};
use crate::ioutil::iotimeout;


/// Pick the socket family and the address to actually connect to.
///
/// An IPv6 socket reaches IPv4 targets through their IPv4-mapped address; an
/// IPv4 socket can only reach IPv6 targets which are IPv4-mapped.
pub(super) fn resolve_target(addr: SocketAddr, family: Option<AddressFamily>) -> io::Result<(AddressFamily, SocketAddr)> {
	match (family, addr) {
		(None, SocketAddr::V4(_)) | (Some(AddressFamily::V4), SocketAddr::V4(_)) => Ok((AddressFamily::V4, addr)),
		(None, SocketAddr::V6(_)) | (Some(AddressFamily::V6), SocketAddr::V6(_)) => Ok((AddressFamily::V6, addr)),
		(Some(AddressFamily::V6), SocketAddr::V4(v4)) => {
			Ok((AddressFamily::V6, SocketAddr::new(IpAddr::V6(v4.ip().to_ipv6_mapped()), v4.port())))
		},
		(Some(AddressFamily::V4), SocketAddr::V6(v6)) => match v6.ip().to_ipv4_mapped() {
			Some(ip) => Ok((AddressFamily::V4, SocketAddr::new(IpAddr::V4(ip), v6.port()))),
			None => Err(io::Error::new(io::ErrorKind::InvalidInput, format!("cannot reach {} over IPv4", addr))),
		},
	}
}

fn open_socket(family: AddressFamily, cfg: &config::StreamConfig) -> io::Result<TcpSocket> {
	let domain = match family {
		AddressFamily::V4 => Domain::IPV4,
		AddressFamily::V6 => Domain::IPV6,
	};
	let sock = match Socket::new(domain, Type::STREAM, Some(Protocol::TCP)) {
		Ok(sock) => sock,
		Err(e) => match family {
			AddressFamily::V6 => return Err(io::Error::new(io::ErrorKind::Unsupported, format!("IPv6 is not available on this host: {}", e))),
			AddressFamily::V4 => return Err(e),
		},
	};
	if family == AddressFamily::V6 {
		sock.set_only_v6(false)?;
	}
	sock.set_nodelay(cfg.nodelay)?;
	sock.set_keepalive(cfg.keepalive)?;
	sock.set_nonblocking(true)?;
	let sock: std::net::TcpStream = sock.into();
	Ok(TcpSocket::from_std_stream(sock))
}

/**
Establishes the transport-level connection for a dial.

Socket creation and the connect itself are bounded by the connect timeout
together.
*/
pub(super) struct Connector {
	addr: SocketAddr,
	connect_cfg: config::ClientConfig,
	stream_cfg: config::StreamConfig,
}

impl Connector {
	pub(super) fn new(
			addr: SocketAddr,
			connect_cfg: config::ClientConfig,
			stream_cfg: config::StreamConfig,
	) -> Self {
		Self{
			addr,
			connect_cfg,
			stream_cfg,
		}
	}

	pub(super) async fn connect(self) -> io::Result<TcpStream> {
		let Self{addr, connect_cfg, stream_cfg} = self;
		iotimeout(connect_cfg.connect_timeout, async move {
			let (family, target) = resolve_target(addr, connect_cfg.family)?;
			let sock = open_socket(family, &stream_cfg)?;
			sock.connect(target).await
		}, "connection timed out").await
	}
}
