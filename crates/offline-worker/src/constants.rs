//! Policy constants compiled into the worker

/// Name of the current cache version. Bumping it makes every older cache stale.
pub const CACHE_NAME: &str = "react-gym-v1";

/// Page served when a navigation fails and no cached copy exists
pub const OFFLINE_URL: &str = "/offline";

/// Assets fetched and stored at install time
pub const PRECACHE_ASSETS: &[&str] = &[
    "/",
    "/offline",
    "/assets/app.css",
    "/assets/app.js",
    "/manifest.json",
    "/icon-192x192.png",
    "/icon-512x512.png",
];

/// Image CDN host; its responses carry long cache headers
pub const CDN_HOST_MARKER: &str = "telnyxcloudstorage.com";

pub const STATIC_PATH_MARKERS: &[&str] = &["/assets/", "/icon-"];

pub const STATIC_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "svg", "gif", "woff", "woff2"];

/// LiveView socket endpoint, never intercepted
pub const LIVE_SOCKET_MARKER: &str = "/live/websocket";
