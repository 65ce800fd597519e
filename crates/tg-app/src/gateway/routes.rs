use reqwest::Url;
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayRoute {
    /// Send a prompt or image to start generating
    AddTask,
    GetStatus,
    /// Generated asset as an attachment
    GetResult,
}

impl GatewayRoute {
    pub fn path(&self) -> &'static str {
        match self {
            Self::AddTask => "/add_task",
            Self::GetStatus => "/get_status",
            Self::GetResult => "/get_result",
        }
    }

    pub fn url(&self, host: &str, query: &[(&str, &str)]) -> Result<Url, GatewayError> {
        let base = format!("{}{}", host.trim_end_matches('/'), self.path());
        let url = if query.is_empty() {
            Url::parse(&base)
        } else {
            Url::parse_with_params(&base, query)
        };

        url.map_err(|e| GatewayError::Client(format!("invalid gateway URL `{base}`: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_urls() {
        let url = GatewayRoute::GetStatus
            .url("https://gateway.example/", &[("id", "abc 123")])
            .unwrap();
        assert_eq!(url.as_str(), "https://gateway.example/get_status?id=abc+123");

        let url = GatewayRoute::AddTask.url("http://localhost:4443", &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4443/add_task");
    }

    #[test]
    fn test_bad_host() {
        assert!(matches!(
            GatewayRoute::AddTask.url("not a url", &[]),
            Err(GatewayError::Client(_))
        ));
    }
}
