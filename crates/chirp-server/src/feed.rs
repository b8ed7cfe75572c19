//! Time-ordered feed of posts
//!
//! Posts live in a singly-linked list sorted newest first. Equal
//! timestamps keep insertion order: a new post goes after every post
//! whose timestamp is greater than *or equal to* its own.
//!
//! Links are owned `Option<Box<_>>` values, so splicing moves ownership
//! of the tail instead of juggling aliased pointers. The whole list sits
//! behind one [`ReadWriteLock`]: `add`/`remove` take it exclusively,
//! `contains`/`snapshot` share it.

use chirp_core::ReadWriteLock;
use serde::{Deserialize, Serialize, Serializer};

/// One feed entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub body: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: f64,
}

impl Post {
    pub fn new(body: impl Into<String>, timestamp: f64) -> Self {
        Self { body: body.into(), timestamp }
    }
}

/// Largest magnitude at which every integer is exactly representable in f64
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

// Integral timestamps go out as JSON integers (`100`, not `100.0`).
fn serialize_timestamp<S: Serializer>(timestamp: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if timestamp.fract() == 0.0 && timestamp.abs() <= MAX_EXACT_INTEGER {
        serializer.serialize_i64(*timestamp as i64)
    } else {
        serializer.serialize_f64(*timestamp)
    }
}

type Link = Option<Box<PostNode>>;

struct PostNode {
    post: Post,
    next: Link,
}

/// The list itself; only reachable through the feed's lock
#[derive(Default)]
struct PostList {
    head: Link,
    len: usize,
}

impl PostList {
    /// Walk past every post for which `advance` holds and return the link
    /// where the walk stopped.
    fn seek(&mut self, advance: impl Fn(f64) -> bool) -> &mut Link {
        let mut cursor = &mut self.head;
        while cursor.as_ref().is_some_and(|node| advance(node.post.timestamp)) {
            let Some(node) = cursor else { break };
            cursor = &mut node.next;
        }
        cursor
    }

    fn insert(&mut self, post: Post) {
        let timestamp = post.timestamp;
        let slot = self.seek(|t| t >= timestamp);
        let next = slot.take();
        *slot = Some(Box::new(PostNode { post, next }));
        self.len += 1;
    }

    fn remove(&mut self, timestamp: f64) -> Option<Post> {
        let slot = self.seek(|t| t > timestamp);
        match slot.take() {
            Some(node) if node.post.timestamp == timestamp => {
                let PostNode { post, next } = *node;
                *slot = next;
                self.len -= 1;
                Some(post)
            }
            other => {
                *slot = other;
                None
            }
        }
    }

    fn contains(&self, timestamp: f64) -> bool {
        self.iter()
            .find(|post| post.timestamp <= timestamp)
            .is_some_and(|post| post.timestamp == timestamp)
    }

    fn iter(&self) -> impl Iterator<Item = &Post> {
        std::iter::successors(self.head.as_deref(), |node| node.next.as_deref())
            .map(|node| &node.post)
    }
}

impl Drop for PostList {
    fn drop(&mut self) {
        // Unlink iteratively; the default drop recurses once per node.
        let mut link = self.head.take();
        while let Some(mut node) = link {
            link = node.next.take();
        }
    }
}

/// A feed of posts ordered by timestamp, newest first
///
/// # Example
///
/// ```
/// use chirp_server::TimeOrderedFeed;
///
/// let feed = TimeOrderedFeed::new();
/// feed.add("hi", 100.0);
/// feed.add("yo", 200.0);
///
/// let bodies: Vec<_> = feed.snapshot().into_iter().map(|p| p.body).collect();
/// assert_eq!(bodies, ["yo", "hi"]);
/// assert!(feed.remove(100.0));
/// assert!(!feed.contains(100.0));
/// ```
#[derive(Default)]
pub struct TimeOrderedFeed {
    posts: ReadWriteLock<PostList>,
}

impl TimeOrderedFeed {
    /// Create an empty feed
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a post, keeping newest-first order and FIFO order among ties
    pub fn add(&self, body: impl Into<String>, timestamp: f64) {
        self.posts.lock().insert(Post::new(body, timestamp));
    }

    /// Remove the oldest-inserted post with exactly this timestamp
    ///
    /// Returns `false` if there is none; the feed is then unchanged.
    pub fn remove(&self, timestamp: f64) -> bool {
        self.posts.lock().remove(timestamp).is_some()
    }

    /// Check whether some post has exactly this timestamp
    pub fn contains(&self, timestamp: f64) -> bool {
        self.posts.rlock().contains(timestamp)
    }

    /// Copy every post, in feed order, as of one instant
    pub fn snapshot(&self) -> Vec<Post> {
        let posts = self.posts.rlock();
        let mut out = Vec::with_capacity(posts.len);
        out.extend(posts.iter().cloned());
        out
    }

    /// Number of posts
    pub fn len(&self) -> usize {
        self.posts.rlock().len
    }

    /// Check whether the feed has no posts
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TimeOrderedFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeOrderedFeed")
            .field("len", &self.len())
            .finish()
    }
}
