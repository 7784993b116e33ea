// Content delivery API version path segment.
pub const API_VERSION: &str = "v3";

// Default delivery host. Region specific hosts can be set in the
// configuration.
pub const DEFAULT_HOST: &str = "cdn.contentstack.io";

// GET request URLs longer than this get tunneled as POST with a
// method-override header. Most proxies cap URLs at 8k, stay well below.
pub const MAX_QUERY_URL_LEN: usize = 4096;

// In-memory response cache budget. Responses are JSON documents, a few KB
// each, so this holds roughly a thousand of them.
pub const DEFAULT_CACHE_MEMORY_BYTES: usize = 4 * 1024 * 1024;

// On-disk response cache budget.
pub const DEFAULT_CACHE_DISK_BYTES: u64 = 50 * 1024 * 1024;

// Header used to tunnel GET semantics over a POST request.
pub const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";
