use bouquet::{BouquetError, Set};

fn ints(values: &[i32]) -> Set<i32> {
    values.iter().copied().collect()
}

fn sorted(set: &Set<i32>) -> Vec<i32> {
    let mut values: Vec<i32> = set.elements().copied().collect();
    values.sort();
    values
}

#[test]
fn insert_ignores_duplicates() {
    let mut set = Set::new();
    assert!(set.insert("a"));
    assert!(set.insert("b"));
    assert!(!set.insert("a"));
    assert_eq!(set.len(), 2);
}

#[test]
fn union_size_follows_inclusion_exclusion() {
    let a = ints(&[1, 2, 3, 4]);
    let b = ints(&[3, 4, 5]);
    let union = a.union(&b);
    let intersection = a.intersection(&b);
    assert_eq!(union.len(), a.len() + b.len() - intersection.len());
    assert_eq!(sorted(&union), [1, 2, 3, 4, 5]);
    assert_eq!(sorted(&intersection), [3, 4]);
    assert_eq!(sorted(&a.difference(&b)), [1, 2]);
}

#[test]
fn difference_with_itself_is_empty() {
    let a = ints(&[7, 8, 9]);
    assert!(a.difference(&a).is_empty());
    assert!(a.is_subset(&a));
}

#[test]
fn choose_then_reinsert_restores_the_set() {
    let mut set = ints(&[1, 2, 3, 4, 5]);
    let chosen = set.choose(2).unwrap();
    assert_eq!(chosen.len(), 2);
    assert_eq!(set.len(), 3);
    assert!(chosen.elements().all(|value| set.contains(value).is_none()));

    set.extend(chosen.elements().copied());
    assert_eq!(sorted(&set), [1, 2, 3, 4, 5]);
}

#[test]
fn choose_more_than_available_fails_without_removing() {
    let mut set = ints(&[1, 2]);
    let err = set.choose(3).unwrap_err();
    assert!(matches!(
        err,
        BouquetError::InsufficientElements {
            requested: 3,
            available: 2
        }
    ));
    assert_eq!(set.len(), 2);
}

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: u32,
    name: &'static str,
}

#[test]
fn keyed_sets_compare_by_extracted_key() {
    let mut users = Set::keyed(|user: &User| user.id);
    users.insert(User { id: 1, name: "ada" });
    assert!(!users.insert(User {
        id: 1,
        name: "impostor"
    }));

    let lookup = User { id: 1, name: "" };
    // The stored element comes back, not the lookup key.
    assert_eq!(users.contains(&lookup).map(|user| user.name), Some("ada"));
    assert_eq!(users.delete(&lookup).map(|user| user.name), Some("ada"));
    assert!(users.is_empty());
}

#[test]
fn custom_equality_uses_the_predicate() {
    let mut words = Set::with_eq(|a: &String, b: &String| a.eq_ignore_ascii_case(b));
    words.insert("Hello".to_string());
    assert!(!words.insert("HELLO".to_string()));
    assert!(words.insert("world".to_string()));

    let shouted = words.map(|word| word.to_uppercase());
    let collected: Vec<&String> = shouted.elements().collect();
    assert_eq!(collected, ["HELLO", "WORLD"]);
}

#[test]
fn binary_operations_take_the_left_operands_equality() {
    let mut left = Set::with_eq(|a: &i32, b: &i32| a % 10 == b % 10);
    left.insert(1);
    left.insert(2);
    let right = ints(&[11, 3]);
    // 11 matches 1 under the left set's equality, so it is not added.
    let union = left.union(&right);
    let values: Vec<i32> = union.elements().copied().collect();
    assert_eq!(values, [1, 2, 3]);
}

#[test]
fn map_and_filter_preserve_insertion_order() {
    let set = ints(&[5, 3, 8, 1]);
    let doubled: Vec<i32> = set.map(|n| n * 2).elements().copied().collect();
    assert_eq!(doubled, [10, 6, 16, 2]);
    let odd: Vec<i32> = set.filter(|n| n % 2 == 1).elements().copied().collect();
    assert_eq!(odd, [5, 3, 1]);

    let mut visited = Vec::new();
    set.for_each(|n| visited.push(*n));
    assert_eq!(visited, [5, 3, 8, 1]);
}
