//! Choosing which pages of an invoice to send for extraction.

/// Pages taken from the start of a long invoice.
pub const HEAD_PAGES: usize = 2;

/// Pages taken from the end of a long invoice.
pub const TAIL_PAGES: usize = 2;

/// Invoices with at most this many pages are sent whole.
pub const MAX_ANALYZED_PAGES: usize = HEAD_PAGES + TAIL_PAGES;

/// Pick the pages of one invoice that carry the header and the totals.
///
/// Returns a sorted, duplicate-free subset of `pages`: all of them when
/// there are at most four distinct ordinals, otherwise the two lowest and
/// the two highest.
pub fn select_pages(pages: &[usize]) -> Vec<usize> {
    let mut distinct = pages.to_vec();
    distinct.sort_unstable();
    distinct.dedup();

    if distinct.len() <= MAX_ANALYZED_PAGES {
        return distinct;
    }

    let tail_start = distinct.len() - TAIL_PAGES;
    let mut selected = distinct[..HEAD_PAGES].to_vec();
    selected.extend_from_slice(&distinct[tail_start..]);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_invoice_sent_whole() {
        assert_eq!(select_pages(&[3, 1, 2]), vec![1, 2, 3]);
        assert_eq!(select_pages(&[0, 1, 2, 3]), vec![0, 1, 2, 3]);
        assert_eq!(select_pages(&[]), Vec::<usize>::new());
    }

    #[test]
    fn test_long_invoice_head_and_tail() {
        assert_eq!(select_pages(&[0, 1, 2, 3, 4, 5, 6]), vec![0, 1, 5, 6]);
        assert_eq!(select_pages(&[9, 4, 7, 5, 8]), vec![4, 5, 8, 9]);
    }

    #[test]
    fn test_duplicates_collapse() {
        assert_eq!(select_pages(&[2, 2, 2, 2, 2]), vec![2]);
        assert_eq!(select_pages(&[0, 0, 1, 1, 2, 2]), vec![0, 1, 2]);
    }

    #[test]
    fn test_selection_properties() {
        let inputs: Vec<Vec<usize>> = vec![
            (0..1).collect(),
            (0..5).collect(),
            (10..40).rev().collect(),
            vec![5, 3, 5, 9, 1, 1, 12, 7],
        ];

        for input in inputs {
            let selected = select_pages(&input);
            let mut distinct = input.clone();
            distinct.sort_unstable();
            distinct.dedup();

            assert!(selected.len() <= MAX_ANALYZED_PAGES);
            assert!(selected.windows(2).all(|w| w[0] < w[1]));
            assert!(selected.iter().all(|p| input.contains(p)));
            assert_eq!(selected.first(), distinct.first());
            assert_eq!(selected.last(), distinct.last());
            if distinct.len() <= MAX_ANALYZED_PAGES {
                assert_eq!(selected, distinct);
            }
        }
    }
}
