use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Top level of the storefront `freeGamesPromotions` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PromotionsResponse {
    pub data: PromotionsData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromotionsData {
    #[serde(rename = "Catalog")]
    pub catalog: Catalog,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub search_store: SearchStore,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchStore {
    #[serde(default)]
    pub elements: Vec<Game>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub key_images: Vec<KeyImage>,
    #[serde(default)]
    pub catalog_ns: Option<CatalogNamespace>,
    pub price: Price,
    #[serde(default)]
    pub promotions: Option<Promotions>,
}

impl Game {
    pub fn image_url(&self, kind: &str) -> Option<&str> {
        self.key_images
            .iter()
            .find(|image| image.image_type == kind)
            .map(|image| image.url.as_str())
    }

    pub fn page_slug(&self, page_type: &str) -> Option<&str> {
        self.catalog_ns
            .as_ref()?
            .mappings
            .as_deref()?
            .iter()
            .find(|mapping| mapping.page_type == page_type)
            .map(|mapping| mapping.page_slug.as_str())
    }

    /// All offers of this game, flattened across promotion groups.
    pub fn offers(&self) -> impl Iterator<Item = &PromotionalOffer> {
        self.promotions
            .iter()
            .flat_map(|p| p.promotional_offers.iter())
            .flat_map(|group| group.promotional_offers.iter())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyImage {
    #[serde(rename = "type")]
    pub image_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogNamespace {
    #[serde(default)]
    pub mappings: Option<Vec<PageMapping>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMapping {
    pub page_slug: String,
    pub page_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub total_price: TotalPrice,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalPrice {
    pub original_price: i64,
    pub fmt_price: FormattedPrice,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedPrice {
    pub original_price: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotions {
    #[serde(default)]
    pub promotional_offers: Vec<PromotionGroup>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionGroup {
    #[serde(default)]
    pub promotional_offers: Vec<PromotionalOffer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionalOffer {
    /// Kept verbatim: the dedup key is built from the raw strings.
    pub start_date: String,
    pub end_date: String,
    pub discount_setting: DiscountSetting,
}

impl PromotionalOffer {
    /// True for a 100% discount that is running at `now`.
    pub fn is_free_at(&self, now: DateTime<Utc>) -> bool {
        if self.discount_setting.discount_type != "PERCENTAGE"
            || self.discount_setting.discount_percentage != 0
        {
            return false;
        }
        match (parse_date(&self.start_date), parse_date(&self.end_date)) {
            (Some(start), Some(end)) => start < now && now < end,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountSetting {
    pub discount_type: String,
    #[serde(default)]
    pub discount_percentage: i64,
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}
