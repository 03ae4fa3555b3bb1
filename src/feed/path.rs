/// Names of the currently open elements, root first.
///
/// Keeps a slash-joined rendering (`rss/channel/item/title`) in sync with the
/// segment list so lookups don't have to rebuild the string on every event.
#[derive(Debug, Default)]
pub(crate) struct PathStack {
    joined: String,
    /// Byte offset in `joined` where each segment's separator starts.
    marks: Vec<usize>,
}

impl PathStack {
    pub(crate) fn push(&mut self, name: &str) {
        self.marks.push(self.joined.len());
        if !self.joined.is_empty() {
            self.joined.push('/');
        }
        self.joined.push_str(name);
    }

    /// Closes the innermost element. Popping an empty stack is a no-op.
    pub(crate) fn pop(&mut self) {
        if let Some(mark) = self.marks.pop() {
            self.joined.truncate(mark);
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.joined
    }

    pub(crate) fn depth(&self) -> usize {
        self.marks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}
