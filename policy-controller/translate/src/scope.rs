use gateway_policy_controller_core::xds::{
    route::TypedPerFilterConfig, HeaderValueOption, RateLimitDescriptor, Route,
    RouteConfiguration, RouteAction, VirtualHost,
};

/// A configuration object that a policy may be applied to.
///
/// Every scope carries per-filter overrides and request headers. Rate limit
/// actions and route action settings only exist at narrower scopes.
pub trait Scope {
    fn typed_per_filter_config(&mut self) -> &mut TypedPerFilterConfig;

    fn request_headers_to_add(&mut self) -> &mut Vec<HeaderValueOption>;

    fn rate_limits(&mut self) -> Option<&mut Vec<RateLimitDescriptor>>;

    fn route_action(&mut self) -> Option<&mut RouteAction>;
}

impl Scope for Route {
    fn typed_per_filter_config(&mut self) -> &mut TypedPerFilterConfig {
        &mut self.typed_per_filter_config
    }

    fn request_headers_to_add(&mut self) -> &mut Vec<HeaderValueOption> {
        &mut self.request_headers_to_add
    }

    fn rate_limits(&mut self) -> Option<&mut Vec<RateLimitDescriptor>> {
        Some(&mut self.route.rate_limits)
    }

    fn route_action(&mut self) -> Option<&mut RouteAction> {
        Some(&mut self.route)
    }
}

impl Scope for VirtualHost {
    fn typed_per_filter_config(&mut self) -> &mut TypedPerFilterConfig {
        &mut self.typed_per_filter_config
    }

    fn request_headers_to_add(&mut self) -> &mut Vec<HeaderValueOption> {
        &mut self.request_headers_to_add
    }

    fn rate_limits(&mut self) -> Option<&mut Vec<RateLimitDescriptor>> {
        Some(&mut self.rate_limits)
    }

    fn route_action(&mut self) -> Option<&mut RouteAction> {
        None
    }
}

impl Scope for RouteConfiguration {
    fn typed_per_filter_config(&mut self) -> &mut TypedPerFilterConfig {
        &mut self.typed_per_filter_config
    }

    fn request_headers_to_add(&mut self) -> &mut Vec<HeaderValueOption> {
        &mut self.request_headers_to_add
    }

    fn rate_limits(&mut self) -> Option<&mut Vec<RateLimitDescriptor>> {
        None
    }

    fn route_action(&mut self) -> Option<&mut RouteAction> {
        None
    }
}
