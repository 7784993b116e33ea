use crate::http::RequestDescriptor;
use crate::io::HttpResponse;

pub mod filesystem;
pub mod inmemory;
pub mod nocache;

use crate::Result;
pub use filesystem::FileCache;
pub use inmemory::InMemoryCache;
pub use nocache::NoCache;

/// Whether a response is eligible for caching. Failed responses never are.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoragePolicy {
    Allowed,
    Disallowed,
}

impl StoragePolicy {
    pub fn for_response(response: &HttpResponse) -> Self {
        if response.is_ok() {
            StoragePolicy::Allowed
        } else {
            StoragePolicy::Disallowed
        }
    }

    pub fn allowed(&self) -> bool {
        matches!(self, StoragePolicy::Allowed)
    }
}

/// Content addressed response store. Keys are normalized request
/// descriptors, so a tunneled GET and its plain equivalent share one entry.
/// Implementors guarantee atomic store/lookup per key; there is no cross key
/// ordering guarantee. A lookup miss is `Ok(None)`, not an error.
pub trait Cache {
    fn lookup(&self, key: &RequestDescriptor) -> Result<Option<HttpResponse>>;
    fn store(&self, key: &RequestDescriptor, value: &HttpResponse) -> Result<()>;
}

impl<T: Cache> Cache for &T {
    fn lookup(&self, key: &RequestDescriptor) -> Result<Option<HttpResponse>> {
        (*self).lookup(key)
    }

    fn store(&self, key: &RequestDescriptor, value: &HttpResponse) -> Result<()> {
        (*self).store(key, value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_storage_policy_allows_2xx_only() {
        let ok = HttpResponse::builder().status(200).build().unwrap();
        assert!(StoragePolicy::for_response(&ok).allowed());
        let created = HttpResponse::builder().status(201).build().unwrap();
        assert!(StoragePolicy::for_response(&created).allowed());
        let not_found = HttpResponse::builder().status(404).build().unwrap();
        assert!(!StoragePolicy::for_response(&not_found).allowed());
        let server_err = HttpResponse::builder().status(500).build().unwrap();
        assert!(!StoragePolicy::for_response(&server_err).allowed());
    }
}
