//! Announces temporarily free storefront games, each offer exactly once.
pub mod models;

use chrono::{DateTime, Utc};
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use self::models::{Game, PromotionalOffer, PromotionsResponse};
use crate::notifications::models::{Embed, EmbedAuthor, EmbedFooter, EmbedImage, WebhookPayload};
use crate::notifications::senders::{Notifier, SenderError};
use crate::state::{StateError, save_state};

pub const DEFAULT_ENDPOINT: &str = "https://store-site-backend-static-ipv4.ak.epicgames.com";
const PROMOTIONS_PATH: &str = "/freeGamesPromotions?locale=en-US&country=US&allowCountries=US";
const USER_AGENT: &str = "FreeGameReminder/1.2 (Discord bot)";
const FALLBACK_IMAGE: &str = "https://i.mxsmp.com/404";
const STORE_PAGE_BASE: &str = "https://store.epicgames.com/en-US/p/";

#[derive(Error, Debug)]
pub enum FreeGameError {
    #[error("Storefront request failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("Failed to post announcement: {0}")]
    Notify(#[from] SenderError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Contents of `freegame.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FreeGameState {
    /// Keys of offers already announced.
    #[serde(default)]
    pub lastrun: Vec<String>,
    pub webhook: String,
    /// Text sent alongside every announcement, usually a role mention.
    #[serde(default)]
    pub content: String,
}

pub async fn fetch_games(endpoint: &str) -> Result<Vec<Game>, FreeGameError> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()?;
    let url = format!("{}{}", endpoint.trim_end_matches('/'), PROMOTIONS_PATH);
    let response: PromotionsResponse = client
        .get(url)
        .header(header::ACCEPT, "application/json")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let games = response.data.catalog.search_store.elements;
    info!(count = games.len(), "Fetched storefront promotions.");
    Ok(games)
}

/// Returns the free offer running at `now`, if the game normally costs money.
pub fn free_offer(game: &Game, now: DateTime<Utc>) -> Option<&PromotionalOffer> {
    if game.price.total_price.original_price == 0 {
        return None;
    }
    let free: Vec<&PromotionalOffer> = game.offers().filter(|o| o.is_free_at(now)).collect();
    if free.len() > 1 {
        warn!(game = %game.title, offers = free.len(), "Multiple free offers, using the first.");
    }
    free.into_iter().next()
}

/// Stable identity of one promotion: `gameId:startDate+endDate`.
pub fn offer_key(game: &Game, offer: &PromotionalOffer) -> String {
    format!("{}:{}{}", game.id, offer.start_date, offer.end_date)
}

pub fn build_announcement(game: &Game, offer: &PromotionalOffer, content: &str) -> WebhookPayload {
    let previous_price = &game.price.total_price.fmt_price.original_price;
    let page_slug = game.page_slug("productHome").unwrap_or_default();
    let image = game.image_url("OfferImageWide").unwrap_or(FALLBACK_IMAGE);

    WebhookPayload {
        content: content.to_string(),
        username: Some("Epic Freegame".to_string()),
        avatar_url: Some("https://epicgames.com/favicon.ico".to_string()),
        embeds: vec![Embed {
            title: game.title.clone(),
            description: format!("{}\n\n*Previously: ~~{previous_price}~~*", game.description),
            url: Some(format!("{STORE_PAGE_BASE}{page_slug}")),
            author: Some(EmbedAuthor {
                name: "Free on epic".to_string(),
            }),
            footer: Some(EmbedFooter {
                text: "Expires".to_string(),
            }),
            timestamp: Some(offer.end_date.clone()),
            image: Some(EmbedImage::new(image)),
            ..Default::default()
        }],
    }
}

/// Posts every free offer not yet in `state.lastrun`.
///
/// The key is appended and the state file rewritten right after each
/// successful post, so a failure later in the run never causes an earlier
/// offer to be announced twice. A failed post stops the run.
pub async fn announce_new(
    games: &[Game],
    state: &mut FreeGameState,
    state_path: &Path,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
) -> Result<usize, FreeGameError> {
    let mut announced = 0;
    for game in games {
        let Some(offer) = free_offer(game, now) else {
            continue;
        };
        let key = offer_key(game, offer);
        if state.lastrun.contains(&key) {
            debug!(game = %game.title, key = %key, "Offer already announced.");
            continue;
        }

        notifier
            .notify(&build_announcement(game, offer, &state.content))
            .await?;
        info!(game = %game.title, key = %key, "Announced free game.");

        state.lastrun.push(key);
        save_state(state_path, state)?;
        announced += 1;
    }
    Ok(announced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::load_state;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{header as header_matcher, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 8, 6, 12, 0, 0).unwrap()
    }

    fn game_json(id: &str, title: &str, original_price: i64, percentage: i64) -> serde_json::Value {
        json!({
            "id": id,
            "title": title,
            "description": format!("{title} description"),
            "keyImages": [
                {"type": "Thumbnail", "url": "https://img.example/thumb.png"},
                {"type": "OfferImageWide", "url": format!("https://img.example/{id}.png")}
            ],
            "catalogNs": {"mappings": [{"pageSlug": format!("{id}-slug"), "pageType": "productHome"}]},
            "price": {"totalPrice": {
                "originalPrice": original_price,
                "fmtPrice": {"originalPrice": "$19.99"}
            }},
            "promotions": {"promotionalOffers": [{"promotionalOffers": [{
                "startDate": "2022-08-04T15:00:00.000Z",
                "endDate": "2022-08-11T15:00:00.000Z",
                "discountSetting": {"discountType": "PERCENTAGE", "discountPercentage": percentage}
            }]}]}
        })
    }

    fn response_json(games: Vec<serde_json::Value>) -> serde_json::Value {
        json!({"data": {"Catalog": {"searchStore": {"elements": games}}}})
    }

    fn parse_games(games: Vec<serde_json::Value>) -> Vec<Game> {
        let response: PromotionsResponse = serde_json::from_value(response_json(games)).unwrap();
        response.data.catalog.search_store.elements
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<WebhookPayload>>,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, payload: &WebhookPayload) -> Result<(), SenderError> {
            let mut sent = self.sent.lock().unwrap();
            if self.fail_on_call == Some(sent.len()) {
                return Err(SenderError::SendFailed("rate limited".into()));
            }
            sent.push(payload.clone());
            Ok(())
        }
    }

    fn new_state() -> FreeGameState {
        FreeGameState {
            lastrun: Vec::new(),
            webhook: "https://hooks.example/1".to_string(),
            content: "<@&role>".to_string(),
        }
    }

    #[test]
    fn test_free_offer_filtering() {
        let games = parse_games(vec![
            game_json("free", "Free Game", 1999, 0),
            game_json("discounted", "Half Off", 1999, 50),
            game_json("always-free", "F2P", 0, 0),
        ]);

        assert!(free_offer(&games[0], now()).is_some());
        assert!(free_offer(&games[1], now()).is_none());
        assert!(free_offer(&games[2], now()).is_none());

        let later = Utc.with_ymd_and_hms(2022, 8, 12, 0, 0, 0).unwrap();
        assert!(free_offer(&games[0], later).is_none());
    }

    #[test]
    fn test_game_without_promotions_is_skipped() {
        let mut game = game_json("none", "No Promo", 1999, 0);
        game["promotions"] = serde_json::Value::Null;
        let games = parse_games(vec![game]);
        assert!(free_offer(&games[0], now()).is_none());
    }

    #[test]
    fn test_offer_key_and_announcement() {
        let games = parse_games(vec![game_json("abc", "Free Game", 1999, 0)]);
        let offer = free_offer(&games[0], now()).unwrap();

        assert_eq!(
            offer_key(&games[0], offer),
            "abc:2022-08-04T15:00:00.000Z2022-08-11T15:00:00.000Z"
        );

        let payload = build_announcement(&games[0], offer, "<@&role>");
        assert_eq!(payload.content, "<@&role>");
        assert_eq!(payload.username.as_deref(), Some("Epic Freegame"));
        let embed = &payload.embeds[0];
        assert_eq!(embed.title, "Free Game");
        assert_eq!(embed.description, "Free Game description\n\n*Previously: ~~$19.99~~*");
        assert_eq!(embed.url.as_deref(), Some("https://store.epicgames.com/en-US/p/abc-slug"));
        assert_eq!(embed.timestamp.as_deref(), Some("2022-08-11T15:00:00.000Z"));
        assert_eq!(embed.image, Some(EmbedImage::new("https://img.example/abc.png")));
    }

    #[test]
    fn test_missing_image_and_slug_fall_back() {
        let mut game = game_json("abc", "Free Game", 1999, 0);
        game["keyImages"] = json!([]);
        game["catalogNs"] = json!({"mappings": null});
        let games = parse_games(vec![game]);
        let offer = free_offer(&games[0], now()).unwrap();

        let payload = build_announcement(&games[0], offer, "");
        let embed = &payload.embeds[0];
        assert_eq!(embed.image, Some(EmbedImage::new(FALLBACK_IMAGE)));
        assert_eq!(embed.url.as_deref(), Some(STORE_PAGE_BASE));
    }

    #[tokio::test]
    async fn test_same_offer_announced_once_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("freegame.json");
        let games = parse_games(vec![game_json("abc", "Free Game", 1999, 0)]);
        let notifier = RecordingNotifier::default();

        let mut state = new_state();
        save_state(&state_path, &state).unwrap();
        let first = announce_new(&games, &mut state, &state_path, &notifier, now())
            .await
            .unwrap();
        assert_eq!(first, 1);

        // Second run starts from what the first one persisted.
        let mut state: FreeGameState = load_state(&state_path).unwrap();
        assert_eq!(state.lastrun.len(), 1);
        let second = announce_new(&games, &mut state, &state_path, &notifier, now())
            .await
            .unwrap();
        assert_eq!(second, 0);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_earlier_announcements() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("freegame.json");
        let games = parse_games(vec![
            game_json("first", "First", 1999, 0),
            game_json("second", "Second", 2999, 0),
        ]);
        let notifier = RecordingNotifier {
            fail_on_call: Some(1),
            ..Default::default()
        };

        let mut state = new_state();
        let result = announce_new(&games, &mut state, &state_path, &notifier, now()).await;
        assert!(matches!(result, Err(FreeGameError::Notify(_))));

        let persisted: FreeGameState = load_state(&state_path).unwrap();
        assert_eq!(
            persisted.lastrun,
            vec!["first:2022-08-04T15:00:00.000Z2022-08-11T15:00:00.000Z".to_string()]
        );
        assert_eq!(persisted.webhook, "https://hooks.example/1");
    }

    #[tokio::test]
    async fn test_fetch_games_from_storefront() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/freeGamesPromotions"))
            .and(query_param("locale", "en-US"))
            .and(header_matcher("accept", "application/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(response_json(vec![game_json("abc", "Free Game", 1999, 0)])),
            )
            .mount(&mock_server)
            .await;

        let games = fetch_games(&mock_server.uri()).await.unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].id, "abc");
    }

    #[tokio::test]
    async fn test_fetch_games_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            fetch_games(&mock_server.uri()).await,
            Err(FreeGameError::Fetch(_))
        ));
    }
}
