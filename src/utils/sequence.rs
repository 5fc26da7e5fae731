/// Pads `values` to `length` by repeating its last element, cropping anything beyond `length`.
///
/// An empty input stays empty since there is no value to replicate.
pub fn ensure_list<T: Clone>(values: &[T], length: usize) -> Vec<T> {
	let mut list: Vec<T> = values.iter().take(length).cloned().collect();
	if let Some(last) = values.last() {
		while list.len() < length {
			list.push(last.clone());
		}
	}
	list
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_pads_with_last_value() {
		assert_eq!(ensure_list(&[8, 16], 4), vec![8, 16, 16, 16]);
	}

	#[test]
	fn test_crops_long_input() {
		assert_eq!(ensure_list(&[1, 2, 3, 4], 2), vec![1, 2]);
	}

	#[test]
	fn test_empty_input_stays_empty() {
		assert!(ensure_list::<usize>(&[], 3).is_empty());
	}

	proptest! {
		#[test]
		fn prop_length_is_exact_for_non_empty_input(values in prop::collection::vec(0usize..100, 1..8), length in 0usize..16) {
			let list = ensure_list(&values, length);
			prop_assert_eq!(list.len(), length);
			let shared = length.min(values.len());
			prop_assert_eq!(&list[..shared], &values[..shared]);
		}
	}
}
