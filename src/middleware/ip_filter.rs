//! Source-address allow-list for gateway server-to-server calls.

use std::net::{IpAddr, SocketAddr};
use std::task::{Context, Poll};

use axum::extract::connect_info::ConnectInfo;
use axum::http::{Extensions, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use crate::config::AllowedIps;

#[derive(Clone, Debug)]
pub struct IpFilterLayer {
    allowed_ips: AllowedIps,
    trusted_proxy_depth: usize,
}

impl IpFilterLayer {
    pub fn new(allowed_ips: AllowedIps, trusted_proxy_depth: usize) -> Self {
        Self {
            allowed_ips,
            trusted_proxy_depth,
        }
    }
}

impl<S> Layer<S> for IpFilterLayer {
    type Service = IpFilterService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IpFilterService {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IpFilterService<S> {
    inner: S,
    layer: IpFilterLayer,
}

impl<S, B> Service<Request<B>> for IpFilterService<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let client_ip = client_ip(
            req.headers(),
            req.extensions(),
            self.layer.trusted_proxy_depth,
        );

        if !self.layer.allowed_ips.permits(client_ip) {
            tracing::warn!(client_ip = ?client_ip, path = %req.uri().path(), "rejected gateway call from unlisted address");
            return Box::pin(async { Ok((StatusCode::FORBIDDEN, "Forbidden").into_response()) });
        }

        // Take the service that was polled ready and leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(req).await })
    }
}

/// Resolves the caller address, preferring `X-Forwarded-For` when the
/// number of trusted proxies in front of the service is known.
pub fn client_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    trusted_proxy_depth: usize,
) -> Option<IpAddr> {
    forwarded_for(headers, trusted_proxy_depth).or_else(|| {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

fn forwarded_for(headers: &HeaderMap, trusted_proxy_depth: usize) -> Option<IpAddr> {
    if trusted_proxy_depth == 0 {
        return None;
    }

    let chain: Vec<IpAddr> = headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .filter_map(|hop| {
            let hop = hop.trim();
            hop.parse::<IpAddr>()
                .ok()
                .or_else(|| hop.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
        })
        .collect();

    // The last `depth` hops were appended by our own proxies.
    chain
        .len()
        .checked_sub(trusted_proxy_depth)
        .and_then(|index| chain.get(index))
        .copied()
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;
    use ipnet::IpNet;
    use tower::{service_fn, ServiceExt};

    fn sslcommerz_only() -> AllowedIps {
        AllowedIps::Cidrs(vec!["103.26.139.0/24".parse::<IpNet>().expect("valid cidr")])
    }

    fn ipn_request(forwarded: Option<&'static str>) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri("/api/payment/ipn")
            .body(Body::empty())
            .expect("request");
        if let Some(chain) = forwarded {
            req.headers_mut()
                .insert("x-forwarded-for", HeaderValue::from_static(chain));
        }
        req
    }

    async fn status_for(layer: IpFilterLayer, req: Request<Body>) -> StatusCode {
        let service = layer.layer(service_fn(|_req: Request<Body>| async move {
            Ok::<Response, Infallible>(StatusCode::OK.into_response())
        }));
        service.oneshot(req).await.expect("response").status()
    }

    #[test]
    fn forwarded_for_skips_trusted_hops() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.1, 103.26.139.87, 10.0.0.2"),
        );

        assert_eq!(
            forwarded_for(&headers, 2),
            Some(IpAddr::from([103, 26, 139, 87]))
        );
        assert_eq!(forwarded_for(&headers, 4), None);
        assert_eq!(forwarded_for(&headers, 0), None);
    }

    #[tokio::test]
    async fn gateway_address_passes() {
        let layer = IpFilterLayer::new(sslcommerz_only(), 1);
        let status = status_for(layer, ipn_request(Some("198.51.100.1, 103.26.139.87"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn spoofed_leading_hop_is_ignored() {
        let layer = IpFilterLayer::new(sslcommerz_only(), 1);
        let status = status_for(layer, ipn_request(Some("103.26.139.87, 198.51.100.7"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn falls_back_to_peer_address() {
        let layer = IpFilterLayer::new(sslcommerz_only(), 0);
        let mut req = ipn_request(None);
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([103, 26, 139, 20], 443))));

        assert_eq!(status_for(layer, req).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn wildcard_allows_unknown_callers() {
        let layer = IpFilterLayer::new(AllowedIps::Any, 0);
        assert_eq!(status_for(layer, ipn_request(None)).await, StatusCode::OK);
    }
}
