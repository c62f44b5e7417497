//! Admin endpoint gate (`spec.md` §6): reachable without a key from
//! RFC1918/loopback source addresses, otherwise `admin_key` must match the
//! configured value.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use constant_time_eq::constant_time_eq;
use secrecy::ExposeSecret;

use crate::error::ApiError;
use crate::AppState;
use lease_core::LeaseError;

pub async fn admin_gate(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    if is_private_network(addr.ip()) {
        return next.run(req).await;
    }

    let provided = req
        .uri()
        .query()
        .and_then(|q| {
            q.split('&')
                .find_map(|pair| pair.strip_prefix("admin_key="))
        })
        .unwrap_or("");

    let expected = state.admin_key.expose_secret();
    let matches = provided.len() == expected.len()
        && constant_time_eq(provided.as_bytes(), expected.as_bytes());

    if matches {
        next.run(req).await
    } else {
        ApiError::from(LeaseError::Unauthorized).into_response()
    }
}

fn is_private_network(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || is_rfc1918(v4),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

fn is_rfc1918(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    matches!(
        octets,
        [10, ..] | [172, 16..=31, ..] | [192, 168, ..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc1918_ranges_recognized() {
        assert!(is_rfc1918(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(is_rfc1918(Ipv4Addr::new(172, 16, 0, 1)));
        assert!(is_rfc1918(Ipv4Addr::new(172, 31, 255, 255)));
        assert!(!is_rfc1918(Ipv4Addr::new(172, 32, 0, 1)));
        assert!(is_rfc1918(Ipv4Addr::new(192, 168, 1, 1)));
        assert!(!is_rfc1918(Ipv4Addr::new(8, 8, 8, 8)));
    }

    #[test]
    fn loopback_is_private() {
        assert!(is_private_network(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
    }
}
