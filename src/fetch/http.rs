use super::{endpoint_kind, Fetcher, ProviderRateLimiter, ScheduleSource};
use crate::config::{ProviderConfig, SeasonSpec};
use crate::error::{Error, Result};
use crate::models::{Dataset, PbpEvent, RawRecords, ScheduledGame, ShotAttempt};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Provider responses come either bare or wrapped
#[derive(Debug, Deserialize)]
#[serde(untagged, bound(deserialize = "T: DeserializeOwned"))]
enum ListResponse<T> {
    Rows { rows: Vec<T> },
    Events { events: Vec<T> },
    Games { games: Vec<T> },
    Bare(Vec<T>),
}

impl<T> ListResponse<T> {
    fn into_rows(self) -> Vec<T> {
        match self {
            ListResponse::Rows { rows } => rows,
            ListResponse::Events { events } => events,
            ListResponse::Games { games } => games,
            ListResponse::Bare(rows) => rows,
        }
    }
}

/// HTTP provider client.
///
/// Timeouts are enforced by the caller per game; the client itself only
/// paces requests.
pub struct HttpFetcher {
    client: Client,
    base_url: Url,
    source_name: String,
    limiter: ProviderRateLimiter,
}

impl HttpFetcher {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Provider URL '{}' cannot be used as a base",
                config.base_url
            )));
        }
        let client = Client::builder().user_agent(&config.user_agent).build()?;
        Ok(Self {
            client,
            base_url,
            source_name: config.source_name.clone(),
            limiter: ProviderRateLimiter::new(config.rate_limit_per_sec),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config("Invalid provider URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_list<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<Vec<T>> {
        self.limiter.wait().await;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::FetchFailure(format!("{}: {}", what, e)))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(Error::NotFoundUpstream(what.to_string())),
            StatusCode::TOO_MANY_REQUESTS => return Err(Error::RateLimited(what.to_string())),
            status => {
                return Err(Error::FetchFailure(format!(
                    "{}: provider returned {}",
                    what, status
                )))
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::FetchFailure(format!("{}: {}", what, e)))?;
        let parsed: ListResponse<T> = serde_json::from_slice(&body)
            .map_err(|e| Error::Malformed(format!("{}: {}", what, e)))?;
        Ok(parsed.into_rows())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, game_id: &str, dataset: Dataset) -> Result<RawRecords> {
        let kind = endpoint_kind(dataset)?;
        let url = self.endpoint(&["games", game_id, kind])?;
        let what = format!("{} {}", kind, game_id);

        match dataset {
            Dataset::Pbp => Ok(RawRecords::Pbp(self.get_list::<PbpEvent>(url, &what).await?)),
            _ => Ok(RawRecords::Shots(
                self.get_list::<ShotAttempt>(url, &what).await?,
            )),
        }
    }

    fn source_system(&self) -> &str {
        &self.source_name
    }
}

#[async_trait]
impl ScheduleSource for HttpFetcher {
    async fn schedule(&self, season: &SeasonSpec) -> Result<Vec<ScheduledGame>> {
        let mut url = self.endpoint(&["schedule"])?;
        url.query_pairs_mut()
            .append_pair("competition", &season.competition)
            .append_pair("season", season.provider_key());
        self.get_list(url, &format!("schedule {}", season.label)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GameStatus;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_for(server: &MockServer) -> HttpFetcher {
        let config = ProviderConfig {
            base_url: server.uri(),
            rate_limit_per_sec: 1000.0,
            ..ProviderConfig::default()
        };
        HttpFetcher::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_pbp_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/games/0022300001/pbp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rows": [{
                    "game_id": "0022300001", "season": "2023-24", "event_num": 1,
                    "period": 1, "clock": "12:00", "event_type": "jump_ball",
                    "home_score": 0, "away_score": 0
                }]
            })))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let records = fetcher.fetch("0022300001", Dataset::Pbp).await.unwrap();
        assert_eq!(records.dataset(), Dataset::Pbp);
        assert_eq!(records.len(), 1);
        assert_eq!(records.embedded_identity().unwrap().season, "2023-24");
    }

    #[tokio::test]
    async fn test_fetch_maps_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/games/missing/shots"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/games/busy/shots"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/games/broken/shots"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/games/down/shots"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        assert!(matches!(
            fetcher.fetch("missing", Dataset::Shots).await,
            Err(Error::NotFoundUpstream(_))
        ));
        assert!(matches!(
            fetcher.fetch("busy", Dataset::Shots).await,
            Err(Error::RateLimited(_))
        ));
        assert!(matches!(
            fetcher.fetch("broken", Dataset::Shots).await,
            Err(Error::Malformed(_))
        ));
        let down = fetcher.fetch("down", Dataset::Shots).await.unwrap_err();
        assert!(matches!(down, Error::FetchFailure(_)));
        assert!(down.is_retryable());

        assert!(fetcher.fetch("any", Dataset::TeamGame).await.is_err());
    }

    #[tokio::test]
    async fn test_schedule_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schedule"))
            .and(query_param("competition", "nba-regular"))
            .and(query_param("season", "2023"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"game_id": 22300001, "status": "final",
                 "home_team_id": 1610612747, "away_team_id": 1610612738,
                 "scheduled_at": "2023-10-24T23:30:00Z"},
                {"game_id": "0022300002", "status": "scheduled",
                 "home_team_id": "GSW", "away_team_id": "PHX"}
            ])))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let season = SeasonSpec {
            label: "2023-24".to_string(),
            competition: "nba-regular".to_string(),
            provider_season: Some("2023".to_string()),
        };
        let games = fetcher.schedule(&season).await.unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].game_id, "22300001");
        assert_eq!(games[0].status, GameStatus::Final);
        assert!(games[0].scheduled_at.is_some());
        assert_eq!(games[1].scheduled_at, None);
    }
}
