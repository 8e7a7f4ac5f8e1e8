/// Integer handle that can be issued by a [`HandleManager`].
pub trait Handle: Copy + Eq + Ord + std::fmt::Debug {
    fn from_raw(raw: u32) -> Self;
    fn raw(self) -> u32;
}

impl Handle for u32 {
    #[inline]
    fn from_raw(raw: u32) -> Self {
        raw
    }

    #[inline]
    fn raw(self) -> u32 {
        self
    }
}

/// Free-list allocator handing out small, densely packed integer handles.
///
/// Released handles are recycled LIFO before the monotonic counter advances, so
/// handle values stay close to zero and can index flat arrays directly.
#[derive(Debug, Clone)]
pub struct HandleManager<H: Handle = u32> {
    free_handles: Vec<H>,
    current_handle: u32,
}

impl<H: Handle> Default for HandleManager<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Handle> HandleManager<H> {
    pub fn new() -> Self {
        Self {
            free_handles: Vec::new(),
            current_handle: 0,
        }
    }

    /// Returns a recycled handle if one is available, otherwise the next unused value.
    pub fn get_handle(&mut self) -> H {
        if let Some(handle) = self.free_handles.pop() {
            debug_assert!(self.is_valid_handle(handle));
            return handle;
        }
        let handle = H::from_raw(self.current_handle);
        self.current_handle += 1;
        handle
    }

    /// Releases `handle`. Freeing the most recently issued handle shrinks the counter.
    pub fn free_handle(&mut self, handle: H) {
        debug_assert!(self.is_valid_handle(handle));
        debug_assert!(self.is_not_free_handle(handle), "handle {handle:?} freed twice");
        if handle.raw() + 1 == self.current_handle {
            self.current_handle -= 1;
        } else {
            self.free_handles.push(handle);
        }
    }

    /// Linear scan, only meant for assertions.
    pub fn is_not_free_handle(&self, handle: H) -> bool {
        !self.free_handles.contains(&handle)
    }

    pub fn is_valid_handle(&self, handle: H) -> bool {
        handle.raw() < self.current_handle
    }

    /// Upper bound of every handle issued so far.
    pub fn total_handles(&self) -> u32 {
        self.current_handle
    }

    pub fn free_count(&self) -> usize {
        self.free_handles.len()
    }
}
