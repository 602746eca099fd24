use std::ptr;

/// Overlay written into a block while it sits on a free list.
///
/// A free block's first word links to the next free block of the same size
/// class; once the block is handed out, the caller owns every byte and the
/// link no longer exists. Blocks are therefore never smaller than a pointer.
pub(crate) struct FreeNode {
  pub next: *mut FreeNode,
}

impl FreeNode {
  /// Turns raw block memory into a free-list node linking to `next`.
  ///
  /// # Safety
  ///
  /// `block` must be valid for writes of a pointer and aligned for it.
  pub unsafe fn init(
    block: *mut u8,
    next: *mut FreeNode,
  ) -> *mut FreeNode {
    let node = block as *mut FreeNode;
    unsafe { ptr::write(node, FreeNode { next }) };
    node
  }
}
