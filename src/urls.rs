use url::Url;
use uuid::Uuid;

/// Convenience wrapper for URL generation functions.
#[derive(Clone)]
pub struct Urls {
    /// Top-level URL, including trailing slash.
    base: Url,

    /// Path segment under which the whole API is served.
    pub(crate) api_path: String,

    /// Prefix for all reservation URLs.
    reservations_prefix: String,
}

impl Urls {
    /// Create a new instance. `api_path` should *not* include a trailing slash.
    pub fn new(base: impl AsRef<str>, api_path: impl Into<String>) -> Self {
        let base =
            Url::parse(base.as_ref()).unwrap_or_else(|_| panic!("parse {} as URL", base.as_ref()));
        let api_path = api_path.into();
        let reservations_prefix = format!("{}/reservations/", api_path);

        Urls {
            base,
            api_path,
            reservations_prefix,
        }
    }

    pub fn reservations(&self) -> Url {
        self.base
            .join(&self.reservations_prefix)
            .unwrap_or_else(|_| panic!("get reservations URL from {}", self.base))
    }

    pub fn reservation(&self, id: &Uuid) -> Url {
        let id = format!("{}", id);
        self.reservations()
            .join(&id)
            .unwrap_or_else(|_| panic!("get URL for reservation {}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_urls_are_nested_under_the_api() {
        let urls = Urls::new("https://www.example.com/", "api");
        let id = Uuid::new_v4();

        assert_eq!(
            urls.reservation(&id).as_str(),
            format!("https://www.example.com/api/reservations/{}", id)
        );
    }
}
