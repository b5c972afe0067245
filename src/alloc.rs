use std::alloc::Layout;
use std::ptr::NonNull;
use thiserror::Error;

/// Raised when the backing allocator cannot satisfy a request. Insertion and
/// cloning are the only operations that can fail this way; the tree is left
/// unchanged (insert) or fully released (clone).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("node allocation failed")]
pub struct AllocError;

/// Memory source for tree nodes.
///
/// The container never retains an allocator; one is passed to every
/// operation that allocates or frees, and the same allocator must be used
/// for the whole life of a given tree.
pub trait Allocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// # Safety
    /// `ptr` must have been returned by `allocate` on this allocator with
    /// the same `layout`, and must not be used afterward.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process-global allocator.
#[derive(Debug, Default, Copy, Clone)]
pub struct Global;

impl Allocator for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() > 0);
        let raw = unsafe { std::alloc::alloc(layout) };
        NonNull::new(raw).ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout);
    }
}

impl<A: Allocator + ?Sized> Allocator for &A {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }
}

/// Arena backing: nodes live until the bump arena itself is dropped, and
/// individual frees are no-ops. Suits trees that grow and are then thrown
/// away wholesale.
impl Allocator for bumpalo::Bump {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.try_alloc_layout(layout).map_err(|_| AllocError)
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}

#[test]
fn test_global_round_trip() {
    let layout = Layout::new::<[u64; 4]>();
    let ptr = Global.allocate(layout).unwrap();
    unsafe {
        ptr.as_ptr().write_bytes(0xab, layout.size());
        Global.deallocate(ptr, layout);
    }
}

#[test]
fn test_bump_allocates() {
    let bump = bumpalo::Bump::new();
    let layout = Layout::new::<u128>();
    let a = bump.allocate(layout).unwrap();
    let b = bump.allocate(layout).unwrap();
    assert_ne!(a, b);
}
