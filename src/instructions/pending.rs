use crate::{Accessor, Descriptor, Instruction};

/// Field without a value until one is assigned. Reading it through a
/// committed subscriber suspends until then.
pub fn pending() -> Instruction {
	Instruction::new(|_| {
		Ok(Descriptor::Accessor(Accessor {
			suspend: true,
			..Accessor::default()
		}))
	})
}
