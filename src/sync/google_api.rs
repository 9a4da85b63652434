use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Request error: {0}")]
    RequestError(String),
    #[error("Calendar not found: {0}")]
    NotFound(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Authentication failed")]
    AuthenticationFailed,
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::AuthenticationFailed)
    }
}

/// Entry of the remote calendar list, as returned by the service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCalendar {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    pub access_role: Option<String>,
    pub description: Option<String>,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
    pub color_id: Option<String>,
    pub selected: Option<bool>,
}

/// Body of a calendar update, and the reduced record the service answers with.
/// The service leaves `false` booleans out of its responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarPreference {
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub color_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    items: Option<Vec<RemoteCalendar>>,
    next_page_token: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_calendars(&self, access_token: &str) -> Result<Vec<RemoteCalendar>, ApiError>;

    async fn update_calendar(
        &self,
        access_token: &str,
        calendar_id: &str,
        preference: &CalendarPreference,
    ) -> Result<CalendarPreference, ApiError>;
}

pub struct GoogleCalendarClient {
    base_url: String,
    client: reqwest::Client,
}

impl Default for GoogleCalendarClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleCalendarClient {
    pub fn new() -> Self {
        Self {
            base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn calendar_list_url(&self) -> String {
        format!("{}/users/me/calendarList", self.base_url)
    }

    fn calendar_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/{}",
            self.calendar_list_url(),
            urlencoding::encode(calendar_id)
        )
    }

    async fn check_status(
        response: reqwest::Response,
        resource: &str,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            tracing::error!("Authentication failed when requesting {}", resource);
            return Err(ApiError::AuthenticationFailed);
        }

        if status == StatusCode::NOT_FOUND {
            tracing::error!("Calendar not found: {}", resource);
            return Err(ApiError::NotFound(resource.to_string()));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Rate limit exceeded");
            return Err(ApiError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await?;
            tracing::error!("Request for {} failed. Status: {}, Body: {}", resource, status, body);
            return Err(ApiError::RequestError(format!("Status {}: {}", status, body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn list_calendars(&self, access_token: &str) -> Result<Vec<RemoteCalendar>, ApiError> {
        let url = self.calendar_list_url();
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        tracing::info!("Fetching calendar list");

        loop {
            let mut request = self.client.get(&url).bearer_auth(access_token);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await?;
            tracing::info!("Fetch calendar list response status: {}", response.status());

            let response = Self::check_status(response, "calendarList").await?;
            let page: CalendarListResponse = response.json().await?;

            calendars.extend(page.items.unwrap_or_default());

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::info!("Fetched {} calendars successfully", calendars.len());
        Ok(calendars)
    }

    async fn update_calendar(
        &self,
        access_token: &str,
        calendar_id: &str,
        preference: &CalendarPreference,
    ) -> Result<CalendarPreference, ApiError> {
        let url = self.calendar_url(calendar_id);

        tracing::info!("Updating calendar {}", calendar_id);
        tracing::debug!("PUT {} with payload: {:?}", url, preference);

        let response = self
            .client
            .put(&url)
            .bearer_auth(access_token)
            .query(&[("colorRgbFormat", "false"), ("fields", "colorId,selected")])
            .json(preference)
            .send()
            .await?;

        tracing::info!("Update calendar response status: {}", response.status());

        let response = Self::check_status(response, calendar_id).await?;
        let updated: CalendarPreference = response.json().await?;

        tracing::info!("Calendar {} updated successfully", calendar_id);
        Ok(updated)
    }
}
