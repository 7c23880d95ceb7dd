use {
    crate::Gate,
    debug_fn::debug_fn,
    static_assertions::{assert_impl_all, assert_not_impl_any},
    std::{
        fmt::{Debug, Formatter},
        ptr,
    },
};


/// A scoped shared acquisition of at most one [`Gate`].
///
/// A guard is created unbound. [`ReaderGuard::try_bind`] attempts to acquire a gate in
/// shared mode and, on success, binds the guard to it. The acquisition is released when
/// the guard is rebound, explicitly released, or dropped.
///
/// Since the binding represents a unique acquisition, guards can be moved but not
/// cloned.
///
/// # Example
///
/// ```
/// use quiescence_gate::{Gate, ReaderGuard};
///
/// let gate = Gate::new();
/// {
///     let mut guard = ReaderGuard::new();
///     assert!(guard.try_bind(&gate));
///     assert!(!gate.try_begin_busy());
/// }
/// assert!(gate.try_begin_busy());
/// ```
pub struct ReaderGuard<'a> {
    // If this is Some, the guard owns exactly one shared acquisition of the gate.
    gate: Option<&'a Gate>,
}

assert_impl_all!(ReaderGuard<'_>: Send, Sync);
assert_not_impl_any!(ReaderGuard<'_>: Clone, Copy);

impl<'a> ReaderGuard<'a> {
    /// Creates an unbound guard.
    #[inline]
    pub const fn new() -> Self {
        Self { gate: None }
    }

    /// Attempts to bind this guard to a gate.
    ///
    /// - If the guard is already bound to `gate`, this returns `true` without acquiring
    ///   the gate a second time.
    /// - Otherwise any existing binding is released first. Then the gate is acquired
    ///   with [`Gate::acquire_shared`]. If that fails, the guard stays unbound.
    ///
    /// Passing `None` releases any existing binding and returns `false`.
    ///
    /// As with [`Gate::acquire_shared`], binding a second guard to a gate that the
    /// current thread already holds can deadlock while a writer is waiting.
    ///
    /// # Panic
    ///
    /// Panics if releasing the previous binding reveals that its gate has been released
    /// behind the guard's back.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_gate::{Gate, ReaderGuard};
    ///
    /// let gate1 = Gate::new();
    /// let gate2 = Gate::new();
    /// let mut guard = ReaderGuard::new();
    ///
    /// assert!(guard.try_bind(&gate1));
    /// assert!(guard.try_bind(&gate1));
    /// assert_eq!(gate1.shared_holders(), 1);
    ///
    /// assert!(guard.try_bind(&gate2));
    /// assert_eq!(gate1.shared_holders(), 0);
    /// assert_eq!(gate2.shared_holders(), 1);
    ///
    /// gate1.begin_busy();
    /// assert!(!guard.try_bind(&gate1));
    /// assert!(!guard.is_bound());
    /// # gate1.end_busy();
    /// ```
    pub fn try_bind(&mut self, gate: impl Into<Option<&'a Gate>>) -> bool {
        let gate = gate.into();
        if let Some(bound) = self.gate {
            if gate.is_some_and(|gate| ptr::eq(bound, gate)) {
                return true;
            }
            self.release();
        }
        let Some(gate) = gate else {
            return false;
        };
        if !gate.acquire_shared() {
            return false;
        }
        self.gate = Some(gate);
        true
    }

    /// Releases the bound gate, if any.
    ///
    /// Calling this on an unbound guard does nothing.
    ///
    /// # Panic
    ///
    /// Panics if the bound gate has no outstanding shared acquisition. This means that
    /// someone called [`Gate::release_shared`] for an acquisition they did not own.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_gate::{Gate, ReaderGuard};
    ///
    /// let gate = Gate::new();
    /// let mut guard = ReaderGuard::new();
    /// guard.try_bind(&gate);
    /// guard.release();
    /// guard.release();
    /// assert_eq!(gate.shared_holders(), 0);
    /// ```
    pub fn release(&mut self) {
        if let Some(gate) = self.gate.take() {
            assert!(
                gate.release_shared(),
                "reader guard released a gate that was not held",
            );
        }
    }

    /// Returns whether this guard holds a gate.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.gate.is_some()
    }

    /// Returns whether this guard holds this particular gate.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_gate::Gate;
    ///
    /// let gate1 = Gate::new();
    /// let gate2 = Gate::new();
    /// let guard = gate1.try_read().unwrap();
    /// assert!(guard.is_bound_to(&gate1));
    /// assert!(!guard.is_bound_to(&gate2));
    /// ```
    #[inline]
    pub fn is_bound_to(&self, gate: &Gate) -> bool {
        self.gate.is_some_and(|bound| ptr::eq(bound, gate))
    }

    /// Returns the gate held by this guard.
    #[inline]
    pub fn gate(&self) -> Option<&'a Gate> {
        self.gate
    }
}

impl Gate {
    /// Attempts to acquire this gate in shared mode and returns a guard that releases
    /// the acquisition when dropped.
    ///
    /// Returns `None` if the gate is busy. See [`Gate::acquire_shared`].
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_gate::Gate;
    ///
    /// let gate = Gate::new();
    /// let guard = gate.try_read();
    /// assert!(guard.is_some());
    /// drop(guard);
    /// gate.begin_busy();
    /// assert!(gate.try_read().is_none());
    /// ```
    #[inline]
    pub fn try_read(&self) -> Option<ReaderGuard<'_>> {
        let mut guard = ReaderGuard::new();
        guard.try_bind(self).then_some(guard)
    }
}

impl Default for ReaderGuard<'_> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReaderGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.release();
    }
}

impl Debug for ReaderGuard<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderGuard")
            .field(
                "gate_id",
                &debug_fn(|fmt| match self.gate {
                    Some(gate) => Debug::fmt(&gate.addr(), fmt),
                    None => fmt.write_str("<unbound>"),
                }),
            )
            .finish_non_exhaustive()
    }
}
