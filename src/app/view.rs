use serde::Serialize;
use std::collections::HashMap;
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::app::filter::{DirectoryFilter, SortMode};
use crate::app::i18n::Catalog;
use crate::domain::listing::Listing;
use crate::domain::preferences::{Language, TextDirection};
use crate::domain::vote::VoteDirection;

/// A listing as shown on a directory card.
#[derive(Debug, Clone, Serialize)]
pub struct ListingCard {
    #[serde(flatten)]
    pub listing: Listing,
    pub average_rating: f64,
    pub rating_count: usize,
    pub rating_label: String,
    pub comments_label: String,
    pub is_new: bool,
    pub my_vote: Option<VoteDirection>,
    pub added: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectedListing {
    pub card: ListingCard,
    pub share_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryPage {
    pub language: Language,
    pub direction: TextDirection,
    pub city: Option<String>,
    pub query: String,
    pub sort: SortMode,
    pub total: usize,
    pub summary: Option<String>,
    pub empty_message: Option<String>,
    pub listings: Vec<ListingCard>,
    pub selected: Option<SelectedListing>,
}

/// Everything a card needs, localised for `language`.
pub fn listing_card(
    catalog: &Catalog,
    language: Language,
    listing: Listing,
    my_vote: Option<VoteDirection>,
    now: OffsetDateTime,
) -> ListingCard {
    let average = listing.average_rating();
    let count = listing.rating_count();
    let rating_label = if count == 0 {
        catalog.t(language, "card.noRatings")
    } else {
        format!(
            "{:.1} {}",
            average,
            catalog.t_count(language, "card.ratingAverage", count as u64, &[])
        )
    };
    let comments_label = catalog.t_count(
        language,
        "card.comments",
        listing.comment_count.max(0) as u64,
        &[],
    );

    ListingCard {
        average_rating: average,
        rating_count: count,
        rating_label,
        comments_label,
        is_new: listing.is_new(now),
        my_vote,
        added: catalog.time_ago(language, listing.created_at, now),
        listing,
    }
}

/// `?plumber=<id>` on the public base URL.
pub fn share_url(base: &Url, id: Uuid) -> String {
    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .append_pair("plumber", &id.to_string());
    url.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub id: Uuid,
    pub name: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub average_rating: f64,
    pub image_url: Option<String>,
}

/// Markers for every listing with a full coordinate pair.
pub fn map_markers(listings: &[Listing]) -> Vec<MapMarker> {
    listings
        .iter()
        .filter_map(|listing| {
            let (latitude, longitude) = listing.coordinates()?;
            Some(MapMarker {
                id: listing.id,
                name: listing.name.clone(),
                city: listing.city.clone(),
                latitude,
                longitude,
                average_rating: listing.average_rating(),
                image_url: listing.image_url.clone(),
            })
        })
        .collect()
}

pub struct PageRequest<'a> {
    pub language: Language,
    pub filter: &'a DirectoryFilter,
    pub selected: Option<Uuid>,
    pub base_url: &'a Url,
    pub now: OffsetDateTime,
}

/// Filter, sort and localise the mirror for one reader.
pub fn directory_page(
    catalog: &Catalog,
    request: PageRequest<'_>,
    listings: &[Listing],
    votes: &HashMap<Uuid, VoteDirection>,
) -> DirectoryPage {
    let PageRequest {
        language,
        filter,
        selected,
        base_url,
        now,
    } = request;

    let visible = filter.apply(listings);
    let total = visible.len();

    let summary = (total > 0)
        .then(|| catalog.t_count(language, "directory.plumbersFound", total as u64, &[]));
    let empty_message = (total == 0).then(|| {
        if filter.has_query() {
            catalog.t_with(
                language,
                "directory.noSearchResults",
                &[("query", filter.query.trim())],
            )
        } else {
            let city = filter
                .city
                .clone()
                .unwrap_or_else(|| catalog.t(language, "directory.allCities"));
            catalog.t_with(language, "directory.noPlumbersMessage", &[("city", city.as_str())])
        }
    });

    let selected = selected
        .and_then(|id| listings.iter().find(|listing| listing.id == id))
        .map(|listing| SelectedListing {
            share_url: share_url(base_url, listing.id),
            card: listing_card(
                catalog,
                language,
                listing.clone(),
                votes.get(&listing.id).copied(),
                now,
            ),
        });

    let cards = visible
        .into_iter()
        .map(|listing| {
            let vote = votes.get(&listing.id).copied();
            listing_card(catalog, language, listing, vote, now)
        })
        .collect();

    DirectoryPage {
        language,
        direction: language.direction(),
        city: filter.city.clone(),
        query: filter.query.clone(),
        sort: filter.sort,
        total,
        summary,
        empty_message,
        listings: cards,
        selected,
    }
}
