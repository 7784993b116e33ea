use crate::cache::Cache;
use crate::http::RequestDescriptor;
use crate::io::HttpResponse;

use crate::Result;

pub struct NoCache;

impl Cache for NoCache {
    fn lookup(&self, _key: &RequestDescriptor) -> Result<Option<HttpResponse>> {
        Ok(None)
    }
    fn store(&self, _key: &RequestDescriptor, _value: &HttpResponse) -> Result<()> {
        Ok(())
    }
}
