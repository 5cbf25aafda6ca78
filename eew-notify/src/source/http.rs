//! ExpTech HTTP API access with node selection.

use std::str::FromStr;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use reqwest::Client;
use tracing::{debug, info};

use crate::earthquake::EewPayload;
use crate::{Error, Result};

const EEW_PATH: &str = "/eq/eew";

/// How to pick the next API node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSelection {
    /// The node after the current one, wrapping around.
    Next,
    /// The lowest-latency node of the last latency test.
    Fastest,
    Random,
    /// An explicit base URL.
    Url(String),
}

impl FromStr for NodeSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "next" => Self::Next,
            "fastest" => Self::Fastest,
            "random" => Self::Random,
            url => Self::Url(url.to_string()),
        })
    }
}

#[derive(Debug)]
struct NodeState {
    /// Nodes ordered by the last latency test, fastest first.
    latencies: Vec<(String, Option<Duration>)>,
    current_index: usize,
    base_url: String,
}

/// HTTP client bound to one of several equivalent API nodes.
pub struct ExpTechHttp {
    client: Client,
    state: RwLock<NodeState>,
}

impl ExpTechHttp {
    /// `nodes` must not be empty; settings validation guarantees it.
    pub fn new(client: Client, nodes: &[String]) -> Result<Self> {
        let first = nodes
            .first()
            .ok_or_else(|| Error::config("at least one API node is required"))?;
        Ok(Self {
            client,
            state: RwLock::new(NodeState {
                latencies: nodes.iter().map(|n| (n.clone(), None)).collect(),
                current_index: 0,
                base_url: first.clone(),
            }),
        })
    }

    pub fn base_url(&self) -> String {
        self.state.read().base_url.clone()
    }

    async fn test_latency(&self, node: &str) -> Option<Duration> {
        let start = Instant::now();
        match self.client.get(format!("{node}{EEW_PATH}")).send().await {
            Ok(response) if response.status().is_success() => Some(start.elapsed()),
            Ok(response) => {
                debug!(node, status = %response.status(), "Latency probe rejected");
                None
            }
            Err(e) => {
                debug!(node, error = %e, "Latency probe failed");
                None
            }
        }
    }

    /// Probe every node and reorder them fastest first. Unreachable nodes sort last.
    pub async fn test_latencies(&self) -> Vec<(String, Option<Duration>)> {
        let nodes: Vec<String> = self
            .state
            .read()
            .latencies
            .iter()
            .map(|(n, _)| n.clone())
            .collect();

        let mut latencies = Vec::with_capacity(nodes.len());
        for node in nodes {
            let latency = self.test_latency(&node).await;
            latencies.push((node, latency));
        }
        sort_by_latency(&mut latencies);

        self.state.write().latencies = latencies.clone();
        latencies
    }

    /// Switch the node used by later requests.
    pub fn switch_node(&self, selection: &NodeSelection) {
        let mut state = self.state.write();
        let len = state.latencies.len();
        let index = match selection {
            NodeSelection::Next => Some((state.current_index + 1) % len),
            NodeSelection::Fastest => Some(0),
            NodeSelection::Random => Some((rand::random::<u64>() % len as u64) as usize),
            NodeSelection::Url(_) => None,
        };

        let url = match (index, selection) {
            (Some(i), _) => {
                state.current_index = i;
                state.latencies[i].0.clone()
            }
            (None, NodeSelection::Url(url)) => url.clone(),
            (None, _) => return,
        };
        state.base_url = url;
        info!(node = %state.base_url, "Switched API node");
    }

    /// Current EEW records.
    pub async fn get_eew(&self) -> Result<Vec<EewPayload>> {
        let url = format!("{}{}", self.base_url(), EEW_PATH);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let records: Vec<EewPayload> = response.json().await?;
        Ok(records)
    }
}

fn sort_by_latency(latencies: &mut [(String, Option<Duration>)]) {
    latencies.sort_by_key(|(_, latency)| latency.unwrap_or(Duration::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http_client::test_client;
    use rstest::rstest;

    fn http() -> ExpTechHttp {
        ExpTechHttp::new(
            test_client(),
            &[
                "https://api-1.example.dev/api/v1".to_string(),
                "https://api-2.example.dev/api/v1".to_string(),
                "https://api-3.example.dev/api/v1".to_string(),
            ],
        )
        .unwrap()
    }

    #[rstest]
    #[case("next", NodeSelection::Next)]
    #[case("fastest", NodeSelection::Fastest)]
    #[case("random", NodeSelection::Random)]
    #[case("https://x.dev", NodeSelection::Url("https://x.dev".to_string()))]
    fn test_parse_selection(#[case] input: &str, #[case] expected: NodeSelection) {
        assert_eq!(input.parse::<NodeSelection>().unwrap(), expected);
    }

    #[test]
    fn test_switch_next_wraps() {
        let http = http();
        http.switch_node(&NodeSelection::Next);
        assert_eq!(http.base_url(), "https://api-2.example.dev/api/v1");
        http.switch_node(&NodeSelection::Next);
        http.switch_node(&NodeSelection::Next);
        assert_eq!(http.base_url(), "https://api-1.example.dev/api/v1");
    }

    #[test]
    fn test_switch_url_and_random() {
        let http = http();
        http.switch_node(&NodeSelection::Url("https://custom.dev".to_string()));
        assert_eq!(http.base_url(), "https://custom.dev");

        http.switch_node(&NodeSelection::Random);
        assert!(http.base_url().starts_with("https://api-"));
    }

    #[test]
    fn test_unreachable_nodes_sort_last() {
        let mut latencies = vec![
            ("a".to_string(), None),
            ("b".to_string(), Some(Duration::from_millis(80))),
            ("c".to_string(), Some(Duration::from_millis(20))),
        ];
        sort_by_latency(&mut latencies);
        let order: Vec<_> = latencies.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_requires_a_node() {
        assert!(ExpTechHttp::new(test_client(), &[]).is_err());
    }
}
