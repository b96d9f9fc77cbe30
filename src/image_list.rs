//! Ordered image list backed by an arena.
//!
//! Images live in slots addressed by [`ImageHandle`]; the list order is a
//! separate vector of handles. Splicing a replacement in at a node's position
//! never invalidates the handles of the other nodes, so a per-image operator
//! can snapshot the handles at the start of a pass and keep walking them while
//! earlier nodes are replaced by one or several images.
//!
//! A node may be *taken* (its image moved out to a local owner) and later
//! *restored* or *spliced*. While taken, the node still occupies its position.
//!
//! Slots freed by a splice or removal are reused. Each reuse bumps the slot's
//! generation, so a handle to the old node never resolves to the new image.

use crate::image::Image;

/// Stable address of a node in one [`ImageList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageHandle {
    slot: usize,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    image: Option<Image>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageList {
    slots: Vec<Slot>,
    order: Vec<ImageHandle>,
    free: Vec<usize>,
}

impl ImageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_images(images: impl IntoIterator<Item = Image>) -> Self {
        let mut list = Self::new();
        list.extend(images);
        list
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn alloc(&mut self, image: Image) -> ImageHandle {
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot];
            entry.image = Some(image);
            return ImageHandle { slot, generation: entry.generation };
        }
        self.slots.push(Slot { generation: 0, image: Some(image) });
        ImageHandle { slot: self.slots.len() - 1, generation: 0 }
    }

    /// Empty the node's slot and hand it to the free list.
    fn release(&mut self, handle: ImageHandle) -> Option<Image> {
        let entry = self.live_mut(handle)?;
        let image = entry.image.take();
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.slot);
        image
    }

    fn live(&self, handle: ImageHandle) -> Option<&Slot> {
        self.slots
            .get(handle.slot)
            .filter(|entry| entry.generation == handle.generation)
    }

    fn live_mut(&mut self, handle: ImageHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.slot)
            .filter(|entry| entry.generation == handle.generation)
    }

    /// Append at the end.
    pub fn push(&mut self, image: Image) -> ImageHandle {
        let handle = self.alloc(image);
        self.order.push(handle);
        handle
    }

    pub fn extend(&mut self, images: impl IntoIterator<Item = Image>) {
        for image in images {
            self.push(image);
        }
    }

    /// Move every image of `other` to the end of this list, keeping order.
    pub fn append(&mut self, other: ImageList) {
        self.extend(other.into_images());
    }

    /// Insert before `index`. An index equal to the length appends.
    pub fn insert(&mut self, index: usize, image: Image) -> Option<ImageHandle> {
        if index > self.order.len() {
            return None;
        }
        let handle = self.alloc(image);
        self.order.insert(index, handle);
        Some(handle)
    }

    /// Handles in list order, as of now.
    pub fn handles(&self) -> Vec<ImageHandle> {
        self.order.clone()
    }

    pub fn handle_at(&self, index: usize) -> Option<ImageHandle> {
        self.order.get(index).copied()
    }

    pub fn position(&self, handle: ImageHandle) -> Option<usize> {
        self.order.iter().position(|&h| h == handle)
    }

    pub fn get(&self, handle: ImageHandle) -> Option<&Image> {
        self.live(handle).and_then(|entry| entry.image.as_ref())
    }

    pub fn get_mut(&mut self, handle: ImageHandle) -> Option<&mut Image> {
        self.live_mut(handle).and_then(|entry| entry.image.as_mut())
    }

    pub fn at(&self, index: usize) -> Option<&Image> {
        self.handle_at(index).and_then(|h| self.get(h))
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut Image> {
        self.handle_at(index).and_then(|h| self.get_mut(h))
    }

    pub fn first(&self) -> Option<&Image> {
        self.at(0)
    }

    pub fn last(&self) -> Option<&Image> {
        self.len().checked_sub(1).and_then(|i| self.at(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Image> {
        self.order
            .iter()
            .filter_map(|h| self.slots[h.slot].image.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Image> {
        // Handles are unique within `order`, so the borrows never overlap.
        let rank: std::collections::HashMap<usize, usize> =
            self.order.iter().enumerate().map(|(pos, h)| (h.slot, pos)).collect();
        let mut by_slot: Vec<(usize, &mut Image)> = self
            .slots
            .iter_mut()
            .enumerate()
            .filter(|(slot, _)| rank.contains_key(slot))
            .filter_map(|(slot, entry)| entry.image.as_mut().map(|i| (slot, i)))
            .collect();
        by_slot.sort_by_key(|(slot, _)| rank[slot]);
        by_slot.into_iter().map(|(_, image)| image)
    }

    /// Resolve a possibly negative index (`-1` is the last image).
    pub fn resolve_index(&self, index: i64) -> Option<usize> {
        let len = self.len() as i64;
        let idx = if index < 0 { len + index } else { index };
        (0..len).contains(&idx).then_some(idx as usize)
    }

    /// Move a node's image out, leaving its position vacant.
    pub fn take(&mut self, handle: ImageHandle) -> Option<Image> {
        self.live_mut(handle).and_then(|entry| entry.image.take())
    }

    /// Put an image back into a vacant node.
    pub fn restore(&mut self, handle: ImageHandle, image: Image) {
        if let Some(entry) = self.live_mut(handle) {
            entry.image = Some(image);
        }
    }

    /// Replace the node at `handle` with `replacements`, at the same position.
    ///
    /// An empty replacement removes the node. Other handles stay valid.
    pub fn splice(&mut self, handle: ImageHandle, replacements: Vec<Image>) -> Vec<ImageHandle> {
        let Some(pos) = self.position(handle) else {
            return Vec::new();
        };
        self.release(handle);
        let handles: Vec<ImageHandle> = replacements.into_iter().map(|i| self.alloc(i)).collect();
        self.order.splice(pos..=pos, handles.iter().copied());
        handles
    }

    /// Unlink and return the image at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Image> {
        if index >= self.order.len() {
            return None;
        }
        let handle = self.order.remove(index);
        self.release(handle)
    }

    pub fn remove_first(&mut self) -> Option<Image> {
        self.remove(0)
    }

    pub fn remove_last(&mut self) -> Option<Image> {
        self.len().checked_sub(1).and_then(|i| self.remove(i))
    }

    /// Exchange the images at two positions.
    pub fn swap(&mut self, a: usize, b: usize) -> bool {
        if a >= self.len() || b >= self.len() {
            return false;
        }
        self.order.swap(a, b);
        true
    }

    pub fn reverse(&mut self) {
        self.order.reverse();
    }

    /// Drop the whole list and install `images` in its place.
    ///
    /// The old images are released before the new ones become visible.
    pub fn replace_all(&mut self, images: Vec<Image>) {
        self.clear();
        self.extend(images);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
        self.free.clear();
    }

    /// Consume the list, yielding images in order.
    pub fn into_images(mut self) -> Vec<Image> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|h| self.slots[h.slot].image.take())
            .collect()
    }

    /// Clone the images at the given positions.
    pub fn clone_at(&self, indexes: &[usize]) -> Option<Vec<Image>> {
        indexes.iter().map(|&i| self.at(i).cloned()).collect()
    }
}
