//! Content-type filtering for search result links.

use url::Url;

use refresh_shared::{LinkPolicy, SearchConfig};

/// Decides whether a search result link can serve as a reference article.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    policy: LinkPolicy,
    blocked_domains: Vec<String>,
    blocked_extensions: Vec<String>,
}

impl LinkFilter {
    pub fn new(
        policy: LinkPolicy,
        blocked_domains: Vec<String>,
        blocked_extensions: Vec<String>,
    ) -> Self {
        Self {
            policy,
            blocked_domains: blocked_domains
                .into_iter()
                .map(|d| d.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            blocked_extensions: blocked_extensions
                .into_iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            config.link_policy,
            config.blocked_domains.clone(),
            config.blocked_extensions.clone(),
        )
    }

    pub fn accepts(&self, link: &str) -> bool {
        let Ok(url) = Url::parse(link) else {
            return false;
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        let path = url.path().to_ascii_lowercase();

        if self.is_blocked_host(&host) {
            return false;
        }
        if self
            .blocked_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
        {
            return false;
        }

        match self.policy {
            LinkPolicy::ExcludeNonArticle => true,
            LinkPolicy::ArticlePathOnly => {
                let target = format!("{host}{path}");
                target.contains("blog") || target.contains("article")
            }
        }
    }

    fn is_blocked_host(&self, host: &str) -> bool {
        self.blocked_domains.iter().any(|domain| {
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(policy: LinkPolicy) -> LinkFilter {
        LinkFilter::new(
            policy,
            vec!["facebook.com".into(), "x.com".into()],
            vec![".pdf".into(), ".docx".into()],
        )
    }

    #[test]
    fn rejects_documents_and_social() {
        let f = filter(LinkPolicy::ExcludeNonArticle);
        assert!(!f.accepts("https://example.com/whitepaper.pdf"));
        assert!(!f.accepts("https://example.com/Report.PDF"));
        assert!(!f.accepts("https://www.facebook.com/groups/chatbots"));
        assert!(!f.accepts("https://facebook.com/page"));
        assert!(!f.accepts("https://x.com/someone/status/1"));
        assert!(f.accepts("https://example.com/guides/live-chat"));
    }

    #[test]
    fn domain_match_is_suffix_aware() {
        let f = filter(LinkPolicy::ExcludeNonArticle);
        assert!(f.accepts("https://notfacebook.com/blog"));
        assert!(f.accepts("https://box.com/blog/post"));
    }

    #[test]
    fn rejects_non_http_and_garbage() {
        let f = filter(LinkPolicy::ExcludeNonArticle);
        assert!(!f.accepts("ftp://example.com/blog/file"));
        assert!(!f.accepts("not a url"));
    }

    #[test]
    fn article_path_policy_requires_blog_or_article() {
        let f = filter(LinkPolicy::ArticlePathOnly);
        assert!(f.accepts("https://example.com/blog/chatbots"));
        assert!(f.accepts("https://news.example.com/article/123"));
        assert!(f.accepts("https://blog.example.com/post"));
        assert!(!f.accepts("https://example.com/pricing"));
        assert!(!f.accepts("https://example.com/blog/deck.pdf"));
    }
}
