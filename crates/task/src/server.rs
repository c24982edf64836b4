// This file is part of Relayer.
//
// Relayer is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Relayer is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Relayer.
// If not, see https://www.gnu.org/licenses/.

//! Helpers for tasks that expose a network listener

use std::net::SocketAddr;

use anyhow::Context;

/// Format a socket address from a host and port.
pub fn format_socket_addr(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

/// Parse a host and port into a socket address.
pub fn parse_socket_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format_socket_addr(host, port)
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))
}
