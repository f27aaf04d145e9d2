use std::fmt;
use std::path::Path;

/// 選取檔案時通知的對象。 / Receives the file chosen at the end of a browse session.
pub trait FileSelectedListener {
    fn file_selected(&mut self, path: &Path);
}

/// 選取資料夾時通知的對象。 / Receives the directory chosen in a directory-selection flow.
pub trait DirectorySelectedListener {
    fn directory_selected(&mut self, path: &Path);
}

impl<F: FnMut(&Path)> FileSelectedListener for F {
    fn file_selected(&mut self, path: &Path) {
        self(path)
    }
}

impl<F: FnMut(&Path)> DirectorySelectedListener for F {
    fn directory_selected(&mut self, path: &Path) {
        self(path)
    }
}

/// 登記順序內唯一的監聽者識別碼。 / Identifier handed out when a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// 依登記順序觸發且只觸發一次的監聽者清單。 /
/// Ordered listener registry that fires at most once.
pub struct ListenerList<L: ?Sized> {
    next_id: u64,
    entries: Vec<(ListenerId, Box<L>)>,
    fired: bool,
}

impl<L: ?Sized> ListenerList<L> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
            fired: false,
        }
    }

    pub fn add(&mut self, listener: Box<L>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// 依序呼叫每個監聽者；第二次呼叫不做任何事並回傳 0。 /
    /// Invokes every listener in registration order. Later calls do nothing and return 0.
    pub fn fire<F>(&mut self, mut handler: F) -> usize
    where
        F: FnMut(&mut L),
    {
        if self.fired {
            return 0;
        }
        self.fired = true;
        for (_, listener) in self.entries.iter_mut() {
            handler(listener.as_mut());
        }
        self.entries.len()
    }
}

impl<L: ?Sized> Default for ListenerList<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for ListenerList<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<ListenerId> = self.entries.iter().map(|(id, _)| *id).collect();
        f.debug_struct("ListenerList")
            .field("ids", &ids)
            .field("fired", &self.fired)
            .finish()
    }
}
