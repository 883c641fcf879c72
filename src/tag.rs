use core::ops::{BitOr, BitOrAssign};
use serde::{Deserialize, Serialize};




/**
 * The adaptation request attached to a leaf. A tag is a set over
 * {coarsen, keep, refine}; tags coming from different sources (the criterion,
 * another rank, a periodic image) are combined with `|`.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(u8);




/**
 * The decision a tag resolves to.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Coarsen,
    Keep,
    Refine,
}




// ============================================================================
impl Tag {
    pub const NONE: Tag = Tag(0);
    pub const COARSEN: Tag = Tag(1);
    pub const KEEP: Tag = Tag(2);
    pub const REFINE: Tag = Tag(4);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Tag) -> bool {
        self.0 & other.0 == other.0
    }

    /**
     * Resolve the tag to a single action. Refine wins over keep, which wins
     * over coarsen. An empty tag means keep.
     */
    pub fn action(self) -> Action {
        if self.contains(Tag::REFINE) {
            Action::Refine
        } else if self.contains(Tag::KEEP) || self.is_empty() {
            Action::Keep
        } else {
            Action::Coarsen
        }
    }
}




// ============================================================================
impl BitOr for Tag {
    type Output = Tag;

    fn bitor(self, other: Tag) -> Tag {
        Tag(self.0 | other.0)
    }
}

impl BitOrAssign for Tag {
    fn bitor_assign(&mut self, other: Tag) {
        self.0 |= other.0
    }
}
