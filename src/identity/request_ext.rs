use hyper::header::{AsHeaderName, AUTHORIZATION};
use hyper::http::request::Parts;

pub trait HeaderExt {
    fn get_header<K: AsHeaderName>(&self, header: K) -> Option<String>;
    fn bearer_token(&self) -> Option<String>;
}

impl HeaderExt for Parts {
    fn get_header<K>(&self, header: K) -> Option<String>
    where
        K: AsHeaderName,
    {
        self.headers
            .get(header)
            .and_then(|header| header.to_str().ok())
            .map(ToString::to_string)
    }

    fn bearer_token(&self) -> Option<String> {
        let authorization = self.get_header(AUTHORIZATION)?;
        let token = authorization.strip_prefix("Bearer ")?.trim();
        (!token.is_empty()).then(|| token.to_string())
    }
}
