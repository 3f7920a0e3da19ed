/// Stores the request body as the service's last request
pub const REGISTER_REQUEST_PATH: &str = "/registerRequest";

/// Returns the last stored request body (204 when nothing was stored)
pub const LAST_REQUEST_PATH: &str = "/lastRequest";

/// Liveness endpoint of the target service
pub const HEALTH_PATH: &str = "/health";

/// Local API of the tunnel agent listing active tunnels
pub const TUNNELS_API_PATH: &str = "/api/tunnels";

/// Environment variable the target service reads its listen port from
pub const PORT_ENV: &str = "PORT";
