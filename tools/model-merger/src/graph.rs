//! Attachment graph between loaded models
//!
//! Model X hangs off model Y when Y carries a bone named after X's root bone.
//! The graph is built once after loading and consulted by the resolver for
//! root selection and splice ordering.

use hashbrown::HashMap;
use model_common::Model;

#[derive(Debug, Clone, Default)]
pub struct AttachmentGraph {
    /// Per model: the other models that could supply its root bone
    parents: Vec<Vec<usize>>,
}

impl AttachmentGraph {
    pub fn build(models: &[Model]) -> Self {
        let mut owners: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, model) in models.iter().enumerate() {
            for bone in &model.bones {
                owners.entry(bone.name.as_str()).or_default().push(index);
            }
        }

        let parents = models
            .iter()
            .enumerate()
            .map(|(index, model)| match model.root_bone() {
                Some(root) => owners
                    .get(root.name.as_str())
                    .map(|candidates| {
                        candidates
                            .iter()
                            .copied()
                            .filter(|&other| other != index)
                            .collect()
                    })
                    .unwrap_or_default(),
                // Boneless models attach to nothing
                None => Vec::new(),
            })
            .collect();

        Self { parents }
    }

    /// Models carrying a bone named after `index`'s root bone
    pub fn parents_of(&self, index: usize) -> &[usize] {
        self.parents.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any other model could supply this model's root bone
    pub fn is_connectable(&self, index: usize) -> bool {
        !self.parents_of(index).is_empty()
    }

    /// Like [`is_connectable`](Self::is_connectable), restricted to models
    /// flagged in `pending`
    pub fn connectable_among(&self, index: usize, pending: &[bool]) -> bool {
        self.parents_of(index)
            .iter()
            .any(|&other| pending.get(other).copied().unwrap_or(false))
    }
}
