use reqwest::{Client, Method, Url};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
const MAX_META_REFRESHES: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("Too many meta refresh redirects, stopped at {0}")]
    RefreshLoop(Url),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unauthenticated,
    Authenticated,
}

/// A fetched HTML document and the URL it was finally served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    url: Url,
    html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitButton {
    pub name: Option<String>,
    pub value: String,
}

/// An HTML form with its successful controls already collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub action: Url,
    pub method: Method,
    pub fields: Vec<(String, String)>,
    pub buttons: Vec<SubmitButton>,
}

impl Form {
    /// Sets `name` to `value`, replacing an existing control of that name.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The control a user would click to submit, i.e. the last one in the form.
    pub fn primary_button(&self) -> Option<&SubmitButton> {
        self.buttons.last()
    }

    fn payload(&self) -> Vec<(String, String)> {
        let mut payload = self.fields.clone();
        if let Some(SubmitButton {
            name: Some(name),
            value,
        }) = self.primary_button()
        {
            payload.push((name.clone(), value.clone()));
        }
        payload
    }
}

fn resolve(base: &Url, href: &str) -> Result<Url, SessionError> {
    base.join(href.trim()).map_err(|source| SessionError::InvalidUrl {
        url: href.to_string(),
        source,
    })
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Page {
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self {
            url,
            html: html.into(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    pub fn has_form(&self, name: &str) -> bool {
        let document = self.document();
        find_form(&document, name).is_some()
    }

    /// Looks up a form by its `name` or `id` attribute.
    pub fn form(&self, name: &str) -> Result<Option<Form>, SessionError> {
        let document = self.document();
        let Some(element) = find_form(&document, name) else {
            return Ok(None);
        };

        let action = match element.value().attr("action") {
            Some(action) if !action.trim().is_empty() => resolve(&self.url, action)?,
            _ => self.url.clone(),
        };
        let method = match element.value().attr("method") {
            Some(m) if m.eq_ignore_ascii_case("get") => Method::GET,
            _ => Method::POST,
        };

        let (fields, buttons) = collect_controls(element);
        Ok(Some(Form {
            action,
            method,
            fields,
            buttons,
        }))
    }

    /// Finds the first anchor whose visible text is exactly `text` and
    /// resolves its target against the page URL.
    pub fn link_target(&self, text: &str) -> Result<Option<Url>, SessionError> {
        let document = self.document();
        let link_selector = Selector::parse("a[href]").unwrap();
        let wanted = normalize_whitespace(text);

        let href = document
            .select(&link_selector)
            .find(|a| normalize_whitespace(&a.text().collect::<String>()) == wanted)
            .and_then(|a| a.value().attr("href"));

        href.map(|href| resolve(&self.url, href)).transpose()
    }

    fn meta_refresh_target(&self) -> Result<Option<Url>, SessionError> {
        let document = self.document();
        let meta_selector = Selector::parse("meta[http-equiv]").unwrap();

        let content = document
            .select(&meta_selector)
            .find(|m| {
                m.value()
                    .attr("http-equiv")
                    .is_some_and(|v| v.eq_ignore_ascii_case("refresh"))
            })
            .and_then(|m| m.value().attr("content"));

        let Some(content) = content else {
            return Ok(None);
        };

        let target = content.split(';').skip(1).find_map(|part| {
            let part = part.trim();
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("url")
                .then(|| value.trim().trim_matches(|c| c == '\'' || c == '"'))
        });

        match target {
            Some(target) if !target.is_empty() => resolve(&self.url, target).map(Some),
            _ => Ok(None),
        }
    }
}

fn find_form<'a>(document: &'a Html, name: &str) -> Option<ElementRef<'a>> {
    let form_selector = Selector::parse("form").unwrap();
    document.select(&form_selector).find(|form| {
        form.value().attr("name") == Some(name) || form.value().attr("id") == Some(name)
    })
}

fn collect_controls(form: ElementRef) -> (Vec<(String, String)>, Vec<SubmitButton>) {
    let control_selector = Selector::parse("input, textarea, select, button").unwrap();
    let option_selector = Selector::parse("option").unwrap();

    let mut fields = Vec::new();
    let mut buttons = Vec::new();

    for control in form.select(&control_selector) {
        let element = control.value();
        let name = element.attr("name").filter(|n| !n.is_empty());

        match element.name() {
            "input" => {
                let kind = element.attr("type").unwrap_or("text").to_lowercase();
                match kind.as_str() {
                    "submit" | "image" => buttons.push(SubmitButton {
                        name: name.map(str::to_string),
                        value: element.attr("value").unwrap_or_default().to_string(),
                    }),
                    "button" | "reset" | "file" => {}
                    "checkbox" | "radio" => {
                        if let Some(name) = name
                            && element.attr("checked").is_some()
                        {
                            let value = element.attr("value").unwrap_or("on");
                            fields.push((name.to_string(), value.to_string()));
                        }
                    }
                    _ => {
                        if let Some(name) = name {
                            let value = element.attr("value").unwrap_or_default();
                            fields.push((name.to_string(), value.to_string()));
                        }
                    }
                }
            }
            "button" => {
                let kind = element.attr("type").unwrap_or("submit");
                if kind.eq_ignore_ascii_case("submit") {
                    buttons.push(SubmitButton {
                        name: name.map(str::to_string),
                        value: element.attr("value").unwrap_or_default().to_string(),
                    });
                }
            }
            "textarea" => {
                if let Some(name) = name {
                    fields.push((name.to_string(), control.text().collect()));
                }
            }
            "select" => {
                let Some(name) = name else { continue };
                let options: Vec<ElementRef> = control.select(&option_selector).collect();
                let chosen = options
                    .iter()
                    .find(|o| o.value().attr("selected").is_some())
                    .or(options.first());
                if let Some(option) = chosen {
                    let value = option
                        .value()
                        .attr("value")
                        .map(str::to_string)
                        .unwrap_or_else(|| option.text().collect::<String>().trim().to_string());
                    fields.push((name.to_string(), value));
                }
            }
            _ => {}
        }
    }

    (fields, buttons)
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub timeout: Duration,
    /// Extra attempts for a GET that timed out or could not connect.
    pub max_retries: u32,
    /// Delay before the first retry; grows linearly with each attempt.
    pub retry_backoff: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// A browser-like HTTP session bound to one storefront origin.
///
/// Cookies live for as long as the session and start out empty. Redirects,
/// including HTML meta refreshes, are followed before a [`Page`] is returned.
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    origin: Url,
    status: AuthStatus,
    options: SessionOptions,
}

impl HttpSession {
    pub fn new(origin: &str) -> Result<Self, SessionError> {
        Self::with_options(origin, SessionOptions::default())
    }

    pub fn with_options(origin: &str, options: SessionOptions) -> Result<Self, SessionError> {
        let origin = Url::parse(origin).map_err(|source| SessionError::InvalidUrl {
            url: origin.to_string(),
            source,
        })?;

        let client = Client::builder()
            .cookie_store(true)
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            origin,
            status: AuthStatus::Unauthenticated,
            options,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn status(&self) -> AuthStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: AuthStatus) {
        self.status = status;
    }

    /// Fetches a path or absolute URL, resolved against the session origin.
    pub async fn fetch(&self, url_or_path: &str) -> Result<Page, SessionError> {
        let url = resolve(&self.origin, url_or_path)?;
        log::debug!("GET {}", url);
        let page = self.get_with_retry(url).await?;
        self.follow_meta_refresh(page).await
    }

    /// Submits `form` through its primary button after overriding `values`.
    pub async fn submit_form(
        &self,
        form: &Form,
        values: &[(&str, &str)],
    ) -> Result<Page, SessionError> {
        let mut form = form.clone();
        for (name, value) in values {
            form.set(name, value);
        }

        log::debug!("{} {}", form.method, form.action);
        let request = if form.method == Method::GET {
            self.client.get(form.action.clone()).query(&form.payload())
        } else {
            self.client.post(form.action.clone()).form(&form.payload())
        };

        let response = request
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?
            .error_for_status()?;
        let page = read_page(response).await?;
        self.follow_meta_refresh(page).await
    }

    /// Follows the link labelled `text`, or returns `None` if the page has none.
    pub async fn follow_link(
        &self,
        page: &Page,
        text: &str,
    ) -> Result<Option<Page>, SessionError> {
        match page.link_target(text)? {
            Some(target) => Ok(Some(self.fetch(target.as_str()).await?)),
            None => Ok(None),
        }
    }

    async fn follow_meta_refresh(&self, mut page: Page) -> Result<Page, SessionError> {
        for _ in 0..MAX_META_REFRESHES {
            match page.meta_refresh_target()? {
                Some(target) => {
                    log::debug!("Following meta refresh from {} to {}", page.url, target);
                    page = self.get_with_retry(target).await?;
                }
                None => return Ok(page),
            }
        }

        match page.meta_refresh_target()? {
            Some(_) => Err(SessionError::RefreshLoop(page.url)),
            None => Ok(page),
        }
    }

    async fn get_with_retry(&self, url: Url) -> Result<Page, SessionError> {
        let mut attempt = 0;
        loop {
            match self.get_once(url.clone()).await {
                Err(SessionError::HttpError(e))
                    if (e.is_timeout() || e.is_connect()) && attempt < self.options.max_retries =>
                {
                    attempt += 1;
                    let delay = self.options.retry_backoff * attempt;
                    log::warn!(
                        "Transient error fetching {} ({}), retry {}/{} in {:?}",
                        url,
                        e,
                        attempt,
                        self.options.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn get_once(&self, url: Url) -> Result<Page, SessionError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?
            .error_for_status()?;
        read_page(response).await
    }
}

async fn read_page(response: reqwest::Response) -> Result<Page, SessionError> {
    let url = response.url().clone();
    let html = response
        .text()
        .await
        .inspect_err(|e| log::error!("Decode error: {e:?}"))?;
    Ok(Page { url, html })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page(html: &str) -> Page {
        Page::new(
            Url::parse("https://www.amazon.de/gp/css/order-history?orderFilter=year-2012").unwrap(),
            html,
        )
    }

    #[test]
    fn test_form_collects_controls() {
        let page = sample_page(
            r#"
            <form name="signIn" method="post" action="/ap/signin">
                <input type="hidden" name="appActionToken" value="tok123">
                <input type="email" name="email">
                <input type="password" name="password">
                <input type="checkbox" name="rememberMe" value="true">
                <input type="radio" name="create" value="0" checked>
                <select name="lang"><option value="en">en</option><option value="de" selected>de</option></select>
                <input type="submit" name="continue" value="Weiter">
                <button type="submit" name="signInSubmit" value="1">Anmelden</button>
            </form>
            "#,
        );

        let form = page.form("signIn").unwrap().expect("Should find the form");
        assert_eq!(form.method, Method::POST);
        assert_eq!(form.action.as_str(), "https://www.amazon.de/ap/signin");
        assert_eq!(form.get("appActionToken"), Some("tok123"));
        assert_eq!(form.get("email"), Some(""));
        assert_eq!(form.get("rememberMe"), None);
        assert_eq!(form.get("create"), Some("0"));
        assert_eq!(form.get("lang"), Some("de"));
        assert_eq!(form.buttons.len(), 2);
        assert_eq!(
            form.primary_button().and_then(|b| b.name.as_deref()),
            Some("signInSubmit")
        );
    }

    #[test]
    fn test_form_found_by_id_and_defaults() {
        let page = sample_page(r#"<form id="search" method="GET"><input name="q" value="x"></form>"#);
        let form = page.form("search").unwrap().unwrap();
        assert_eq!(form.method, Method::GET);
        assert_eq!(form.action, *page.url());
        assert!(page.form("signIn").unwrap().is_none());
        assert!(!page.has_form("signIn"));
    }

    #[test]
    fn test_form_payload_uses_primary_button() {
        let page = sample_page(
            r#"<form name="signIn"><input name="email"><input type="submit" name="go" value="Go"></form>"#,
        );
        let mut form = page.form("signIn").unwrap().unwrap();
        form.set("email", "me@example.com");
        form.set("password", "secret");
        assert_eq!(
            form.payload(),
            vec![
                ("email".to_string(), "me@example.com".to_string()),
                ("password".to_string(), "secret".to_string()),
                ("go".to_string(), "Go".to_string()),
            ]
        );
    }

    #[test]
    fn test_link_target_matches_exact_text() {
        let page = sample_page(
            r#"
            <a href="/gp/css/order-history?startIndex=10">Weiter&nbsp;»</a>
            <a href="/elsewhere">Weiter zum Warenkorb</a>
            "#,
        );

        let target = page.link_target("Weiter »").unwrap().unwrap();
        assert_eq!(
            target.as_str(),
            "https://www.amazon.de/gp/css/order-history?startIndex=10"
        );
        assert!(page.link_target("Next »").unwrap().is_none());
    }

    #[test]
    fn test_meta_refresh_target() {
        let page = sample_page(r#"<meta http-equiv="Refresh" content="0; URL='/ap/signin?x=1'">"#);
        let target = page.meta_refresh_target().unwrap().unwrap();
        assert_eq!(target.as_str(), "https://www.amazon.de/ap/signin?x=1");

        let without_url = sample_page(r#"<meta http-equiv="refresh" content="30">"#);
        assert!(without_url.meta_refresh_target().unwrap().is_none());
    }

    #[test]
    fn test_invalid_origin() {
        let err = HttpSession::new("not a url").unwrap_err();
        assert!(matches!(err, SessionError::InvalidUrl { .. }));
    }
}
