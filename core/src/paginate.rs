//! Lazy multi-request traversals built on `get` and `list`.
//!
//! # Design
//! Every traversal is an explicit `Iterator` holding just its cursor: the id
//! window position for `GetMulti`, the LIST `position`/`total` pair for
//! `FilteredUris`. A network call happens only when the pending buffer runs
//! dry and the caller asks for the next item. Construction validates the
//! address but never touches the network. After the first error an iterator
//! yields that error once and then ends; restart by building a new one.

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::Value;

use crate::client::CinpClient;
use crate::config::DEFAULT_TIMEOUT;
use crate::error::CinpError;
use crate::http::Transport;
use crate::types::{Object, Verb};
use crate::uri::UriParser;
use crate::validate::check_request;

/// Window sizes for filtered traversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    /// `Count` sent with each LIST.
    pub list_chunk_size: u64,
    /// Ids per multi-object GET.
    pub get_chunk_size: usize,
    pub timeout: Duration,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            list_chunk_size: 100,
            get_chunk_size: 10,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// `(object key, values)` pairs fetched in windows of `chunk_size` ids via
/// multi-object GET. Keys are exactly as the server sent them, in server
/// order within each window.
#[derive(Debug)]
pub struct GetMulti<'a, T> {
    client: &'a CinpClient<T>,
    namespace: Vec<String>,
    model: Option<String>,
    ids: Vec<String>,
    chunk_size: usize,
    position: usize,
    pending: VecDeque<(String, Value)>,
    timeout: Duration,
    done: bool,
}

impl<'a, T: Transport> GetMulti<'a, T> {
    fn new(
        client: &'a CinpClient<T>,
        namespace: Vec<String>,
        model: Option<String>,
        ids: Vec<String>,
        chunk_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            namespace,
            model,
            ids,
            chunk_size,
            position: 0,
            pending: VecDeque::new(),
            timeout,
            done: false,
        }
    }

    /// Ids not yet requested from the server.
    pub fn remaining_ids(&self) -> &[String] {
        &self.ids[self.position.min(self.ids.len())..]
    }
}

impl<T: Transport> Iterator for GetMulti<'_, T> {
    type Item = Result<(String, Value), CinpError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pair) = self.pending.pop_front() {
                return Some(Ok(pair));
            }
            if self.done || self.position >= self.ids.len() {
                return None;
            }

            let end = (self.position + self.chunk_size).min(self.ids.len());
            let window = &self.ids[self.position..end];
            self.position = end;

            let uri = self.client.parser().build(
                &self.namespace,
                self.model.as_deref(),
                None,
                Some(window),
            );
            match self.client.get(&uri, true, self.timeout) {
                Ok(values) => self.pending.extend(values),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Ids of every object matching a filter, paging through LIST lazily.
/// Stops once `position >= total`, or when a page reports `count == 0`.
#[derive(Debug)]
pub struct FilteredUris<'a, T> {
    client: &'a CinpClient<T>,
    uri: String,
    filter_name: Option<String>,
    filter: Option<Object>,
    list_chunk_size: u64,
    timeout: Duration,
    position: u64,
    total: u64,
    pending: VecDeque<String>,
    done: bool,
}

impl<T: Transport> FilteredUris<'_, T> {
    /// Fetch the next LIST page and return its ids.
    fn next_page(&mut self) -> Option<Result<Vec<String>, CinpError>> {
        if self.done || self.position >= self.total {
            return None;
        }
        let page = self
            .client
            .list(
                &self.uri,
                self.filter_name.as_deref(),
                self.filter.as_ref(),
                self.position,
                self.list_chunk_size,
                self.timeout,
            )
            .and_then(|(entries, count_map)| {
                let ids = listed_ids(self.client.parser(), &entries)?;
                Ok((ids, count_map))
            });

        match page {
            Ok((ids, count_map)) => {
                tracing::debug!(
                    position = count_map.position,
                    count = count_map.count,
                    total = count_map.total,
                    "cinp: got list page"
                );
                let Some(next) = count_map.position.checked_add(count_map.count) else {
                    self.done = true;
                    return Some(Err(CinpError::ResponseError(format!(
                        "LIST position {} plus count {} overflows",
                        count_map.position, count_map.count
                    ))));
                };
                if count_map.count == 0 {
                    self.done = true;
                }
                self.position = next;
                self.total = count_map.total;
                Some(Ok(ids))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<T: Transport> Iterator for FilteredUris<'_, T> {
    type Item = Result<String, CinpError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.pending.pop_front() {
                return Some(Ok(id));
            }
            match self.next_page()? {
                Ok(ids) => self.pending.extend(ids),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Every object matching a filter: each LIST page is resolved through a
/// `GetMulti` before the next page is requested.
#[derive(Debug)]
pub struct FilteredObjects<'a, T> {
    pages: FilteredUris<'a, T>,
    current: Option<GetMulti<'a, T>>,
    namespace: Vec<String>,
    model: Option<String>,
    get_chunk_size: usize,
    done: bool,
}

impl<T: Transport> Iterator for FilteredObjects<'_, T> {
    type Item = Result<(String, Value), CinpError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(item) = self.current.as_mut().and_then(Iterator::next) {
                if item.is_err() {
                    self.done = true;
                }
                return Some(item);
            }
            match self.pages.next_page()? {
                Ok(ids) => {
                    self.current = Some(GetMulti::new(
                        self.pages.client,
                        self.namespace.clone(),
                        self.model.clone(),
                        ids,
                        self.get_chunk_size,
                        self.pages.timeout,
                    ));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Ids named by the object URIs of a LIST page.
fn listed_ids(parser: &UriParser, entries: &[Value]) -> Result<Vec<String>, CinpError> {
    let uris = entries
        .iter()
        .map(|entry| {
            entry.as_str().ok_or_else(|| {
                CinpError::ResponseError(format!("LIST entry {entry} is not an object URI"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    parser.extract_ids(&uris)
}

fn zero_chunk() -> CinpError {
    CinpError::InvalidRequest("chunk size must be greater than 0".to_string())
}

impl<T: Transport> CinpClient<T> {
    /// Iterate the objects named by `uri`. The ids come from `ids` when
    /// given, otherwise from `uri` itself; the namespace and model always
    /// come from `uri`.
    pub fn get_multi(
        &self,
        uri: &str,
        ids: Option<&[String]>,
        chunk_size: usize,
        timeout: Duration,
    ) -> Result<GetMulti<'_, T>, CinpError> {
        if chunk_size == 0 {
            return Err(zero_chunk());
        }
        let address = self.parser().split(uri)?;
        let ids = match ids {
            Some(ids) => ids.to_vec(),
            None => address.ids.unwrap_or_default(),
        };
        Ok(GetMulti::new(
            self,
            address.namespace,
            address.model,
            ids,
            chunk_size,
            timeout,
        ))
    }

    /// Iterate the objects named by a list of URIs. Ids are gathered from
    /// every URI in order; the namespace and model come from the first.
    pub fn get_multi_uris<S: AsRef<str>>(
        &self,
        uris: &[S],
        chunk_size: usize,
        timeout: Duration,
    ) -> Result<GetMulti<'_, T>, CinpError> {
        if chunk_size == 0 {
            return Err(zero_chunk());
        }
        let Some(first) = uris.first() else {
            return Ok(GetMulti::new(self, Vec::new(), None, Vec::new(), chunk_size, timeout));
        };
        let ids = self.parser().extract_ids(uris)?;
        let address = self.parser().split(first.as_ref())?;
        Ok(GetMulti::new(
            self,
            address.namespace,
            address.model,
            ids,
            chunk_size,
            timeout,
        ))
    }

    /// Lazily page through LIST results, yielding object ids.
    pub fn get_filtered_uris(
        &self,
        uri: &str,
        filter_name: Option<&str>,
        filter: Option<&Object>,
        options: PageOptions,
    ) -> Result<FilteredUris<'_, T>, CinpError> {
        if options.list_chunk_size == 0 {
            return Err(zero_chunk());
        }
        let body = Value::Object(filter.cloned().unwrap_or_default());
        check_request(self.parser(), Verb::List, uri, Some(&body))?;
        Ok(FilteredUris {
            client: self,
            uri: uri.to_string(),
            filter_name: filter_name.map(str::to_string),
            filter: filter.cloned(),
            list_chunk_size: options.list_chunk_size,
            timeout: options.timeout,
            position: 0,
            total: 1,
            pending: VecDeque::new(),
            done: false,
        })
    }

    /// Every object matching the filter, across all LIST pages.
    pub fn get_filtered_objects(
        &self,
        uri: &str,
        filter_name: Option<&str>,
        filter: Option<&Object>,
        options: PageOptions,
    ) -> Result<FilteredObjects<'_, T>, CinpError> {
        if options.get_chunk_size == 0 {
            return Err(zero_chunk());
        }
        let pages = self.get_filtered_uris(uri, filter_name, filter, options)?;
        let address = self.parser().split(uri)?;
        Ok(FilteredObjects {
            pages,
            current: None,
            namespace: address.namespace,
            model: address.model,
            get_chunk_size: options.get_chunk_size,
            done: false,
        })
    }

    /// Objects from the first LIST page only. The LIST is issued now; the
    /// GETs happen lazily.
    pub fn get_filtered_objects_first_page(
        &self,
        uri: &str,
        filter_name: Option<&str>,
        filter: Option<&Object>,
        options: PageOptions,
    ) -> Result<GetMulti<'_, T>, CinpError> {
        if options.get_chunk_size == 0 || options.list_chunk_size == 0 {
            return Err(zero_chunk());
        }
        let (entries, _) = self.list(
            uri,
            filter_name,
            filter,
            0,
            options.list_chunk_size,
            options.timeout,
        )?;
        let ids = listed_ids(self.parser(), &entries)?;
        self.get_multi(uri, Some(&ids), options.get_chunk_size, options.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::http::testing::StubTransport;
    use serde_json::{json, Map};

    const T: Duration = Duration::from_secs(30);

    fn client() -> CinpClient<StubTransport> {
        CinpClient::with_transport(
            ClientConfig::new("http://localhost:8080", "/api/v1/"),
            StubTransport::new(),
        )
        .unwrap()
    }

    fn ids(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| i.to_string()).collect()
    }

    /// Multi-object body for `ids`, keyed in reverse order.
    fn multi_body(ids: &[String]) -> String {
        let mut map = Map::new();
        for id in ids.iter().rev() {
            map.insert(format!("/api/v1/ns/model:{id}:"), json!({"id": id}));
        }
        Value::Object(map).to_string()
    }

    fn list_page(position: u64, count: u64, total: u64, ids: &[String]) -> (Vec<(String, String)>, String) {
        let uris: Vec<String> = ids
            .iter()
            .map(|id| format!("/api/v1/ns/model:{id}:"))
            .collect();
        (
            vec![
                ("Position".to_string(), position.to_string()),
                ("Count".to_string(), count.to_string()),
                ("Total".to_string(), total.to_string()),
            ],
            serde_json::to_string(&uris).unwrap(),
        )
    }

    fn queue_list(c: &CinpClient<StubTransport>, position: u64, count: u64, total: u64, page: &[String]) {
        let (headers, body) = list_page(position, count, total, page);
        let headers: Vec<(&str, &str)> = headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        c.transport().reply(200, &headers, &body);
    }

    #[test]
    fn get_multi_windows_and_keeps_server_order() {
        let c = client();
        let all = ids(0..23);
        for window in all.chunks(10) {
            c.transport().reply(200, &[], &multi_body(window));
        }

        let iter = c.get_multi("/api/v1/ns/model", Some(&all), 10, T).unwrap();
        assert_eq!(c.transport().count(), 0);

        let pairs: Vec<(String, Value)> = iter.collect::<Result<_, _>>().unwrap();
        assert_eq!(pairs.len(), 23);
        assert_eq!(pairs[0].0, "/api/v1/ns/model:9:");
        assert_eq!(pairs[9].0, "/api/v1/ns/model:0:");
        assert_eq!(pairs[22].0, "/api/v1/ns/model:20:");

        let requests = c.transport().requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].url, format!("http://localhost:8080/api/v1/ns/model:{}:", all[..10].join(":")));
        assert_eq!(requests[2].url, "http://localhost:8080/api/v1/ns/model:20:21:22:");
        for req in &requests {
            assert_eq!(req.method, "GET");
            assert_eq!(req.header("Multi-Object"), Some("True"));
        }
    }

    #[test]
    fn get_multi_uses_ids_from_uri() {
        let c = client();
        c.transport().reply(200, &[], &multi_body(&ids(1..3)));
        let pairs: Vec<_> = c
            .get_multi("/api/v1/ns/model:1:2:", None, 10, T)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(c.transport().last().url, "http://localhost:8080/api/v1/ns/model:1:2:");
    }

    #[test]
    fn get_multi_without_ids_is_empty() {
        let c = client();
        assert_eq!(c.get_multi("/api/v1/ns/model", None, 10, T).unwrap().count(), 0);
        assert_eq!(c.transport().count(), 0);
    }

    #[test]
    fn get_multi_uris_gathers_ids_from_every_uri() {
        let c = client();
        c.transport().reply(200, &[], &multi_body(&ids(1..4)));
        let uris = ["/api/v1/ns/model:1:", "/api/v1/ns/model:2:3:"];
        let iter = c.get_multi_uris(&uris, 5, T).unwrap();
        assert_eq!(iter.remaining_ids(), ["1", "2", "3"]);
        assert_eq!(iter.count(), 3);
        assert_eq!(c.transport().last().url, "http://localhost:8080/api/v1/ns/model:1:2:3:");

        let empty: [&str; 0] = [];
        assert_eq!(c.get_multi_uris(&empty, 5, T).unwrap().count(), 0);
    }

    #[test]
    fn get_multi_rejects_zero_chunk_and_bad_uri() {
        let c = client();
        assert!(c.get_multi("/api/v1/ns/model", None, 0, T).unwrap_err().is_invalid_request());
        assert!(c.get_multi("/elsewhere/model", None, 10, T).unwrap_err().is_invalid_request());
        assert_eq!(c.transport().count(), 0);
    }

    #[test]
    fn get_multi_stops_after_error() {
        let c = client();
        c.transport().reply(200, &[], &multi_body(&ids(0..2))).reply(500, &[], "boom");
        let all = ids(0..6);
        let results: Vec<_> = c.get_multi("/api/v1/ns/model", Some(&all), 2, T).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[2], Err(CinpError::ServerError(_))));
        assert_eq!(c.transport().count(), 2);
    }

    #[test]
    fn filtered_uris_pages_until_total() {
        let c = client();
        let all = ids(0..25);
        queue_list(&c, 0, 10, 25, &all[0..10]);
        queue_list(&c, 10, 10, 25, &all[10..20]);
        queue_list(&c, 20, 5, 25, &all[20..25]);

        let options = PageOptions {
            list_chunk_size: 10,
            ..PageOptions::default()
        };
        let iter = c.get_filtered_uris("/api/v1/ns/model", None, None, options).unwrap();
        assert_eq!(c.transport().count(), 0);

        let got: Vec<String> = iter.collect::<Result<_, _>>().unwrap();
        assert_eq!(got, all);

        let requests = c.transport().requests();
        assert_eq!(requests.len(), 3);
        let positions: Vec<_> = requests.iter().map(|r| r.header("Position").unwrap().to_string()).collect();
        assert_eq!(positions, ["0", "10", "20"]);
        assert!(requests.iter().all(|r| r.header("Count") == Some("10")));
    }

    #[test]
    fn filtered_uris_sends_filter() {
        let c = client();
        queue_list(&c, 0, 1, 1, &ids(7..8));
        let filter = json!({"prefix": "a"}).as_object().unwrap().clone();
        let got: Vec<_> = c
            .get_filtered_uris("/api/v1/ns/model", Some("prefix"), Some(&filter), PageOptions::default())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(got, ["7"]);
        let req = c.transport().last();
        assert_eq!(req.header("Filter"), Some("prefix"));
        assert_eq!(req.header("Count"), Some("100"));
        assert_eq!(req.json(), json!({"prefix": "a"}));
    }

    #[test]
    fn filtered_uris_stops_when_server_does_not_advance() {
        let c = client();
        queue_list(&c, 0, 0, 25, &[]);
        let got: Vec<_> = c
            .get_filtered_uris("/api/v1/ns/model", None, None, PageOptions::default())
            .unwrap()
            .collect();
        assert!(got.is_empty());
        assert_eq!(c.transport().count(), 1);
    }

    #[test]
    fn filtered_uris_rejects_overflowing_cursor() {
        let c = client();
        queue_list(&c, u64::MAX, 1, 5, &ids(0..1));
        let got: Vec<_> = c
            .get_filtered_uris("/api/v1/ns/model", None, None, PageOptions::default())
            .unwrap()
            .collect();
        assert_eq!(got.len(), 1);
        assert!(matches!(&got[0], Err(CinpError::ResponseError(m)) if m.contains("overflows")));
        assert_eq!(c.transport().count(), 1);
    }

    #[test]
    fn filtered_uris_requires_uri_entries() {
        let c = client();
        c.transport()
            .reply(200, &[("Position", "0"), ("Count", "2"), ("Total", "2")], "[1, 2]");
        let got: Vec<_> = c
            .get_filtered_uris("/api/v1/ns/model", None, None, PageOptions::default())
            .unwrap()
            .collect();
        assert_eq!(got.len(), 1);
        assert!(matches!(&got[0], Err(CinpError::ResponseError(m)) if m.contains("not an object URI")));
    }

    #[test]
    fn filtered_uris_validates_up_front() {
        let c = client();
        let err = c
            .get_filtered_uris("/api/v1/ns/model:1:", None, None, PageOptions::default())
            .unwrap_err();
        assert!(err.is_invalid_request());
        assert_eq!(c.transport().count(), 0);
    }

    #[test]
    fn filtered_objects_resolves_every_page() {
        let c = client();
        let all = ids(0..5);
        queue_list(&c, 0, 3, 5, &all[0..3]);
        c.transport().reply(200, &[], &multi_body(&all[0..2]));
        c.transport().reply(200, &[], &multi_body(&all[2..3]));
        queue_list(&c, 3, 2, 5, &all[3..5]);
        c.transport().reply(200, &[], &multi_body(&all[3..5]));

        let options = PageOptions {
            list_chunk_size: 3,
            get_chunk_size: 2,
            timeout: T,
        };
        let pairs: Vec<_> = c
            .get_filtered_objects("/api/v1/ns/model", None, None, options)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(pairs.len(), 5);
        let methods: Vec<_> = c.transport().requests().into_iter().map(|r| r.method).collect();
        assert_eq!(methods, ["LIST", "GET", "GET", "LIST", "GET"]);
    }

    #[test]
    fn filtered_objects_first_page_issues_one_list() {
        let c = client();
        let all = ids(0..4);
        queue_list(&c, 0, 2, 4, &all[0..2]);
        c.transport().reply(200, &[], &multi_body(&all[0..2]));

        let options = PageOptions {
            list_chunk_size: 2,
            ..PageOptions::default()
        };
        let iter = c
            .get_filtered_objects_first_page("/api/v1/ns/model", None, None, options)
            .unwrap();
        assert_eq!(c.transport().count(), 1);
        assert_eq!(iter.count(), 2);
        assert_eq!(c.transport().count(), 2);
    }
}
