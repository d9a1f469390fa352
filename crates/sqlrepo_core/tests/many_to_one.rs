mod common;

use common::{for_each_backend, CommentWithUser, User, SOME_DATE, SOME_TIMESTAMP, SOME_USER};
use sqlrepo_core::{Direction, Order, PageRequest, Repository, Sort};

#[test]
fn save_generates_key() {
    for_each_backend(|fx| {
        let comment = CommentWithUser::new(&fx.some_user, "Some content", SOME_TIMESTAMP, 0);
        let saved = fx.comments.save(comment).unwrap();
        assert!(saved.id.is_some(), "backend {:?}", fx.backend);
    });
}

#[test]
fn find_one_returns_comment_with_user_attached() {
    for_each_backend(|fx| {
        let saved = fx.save_comment(&fx.some_user, "Some content", 0);

        let found = fx.comments.find_one(&saved.id.unwrap()).unwrap().unwrap();
        assert_eq!(found, saved);
        assert_eq!(found.user.as_ref(), Some(&fx.some_user));
    });
}

#[test]
fn find_one_of_missing_id_is_absent() {
    for_each_backend(|fx| {
        assert_eq!(fx.comments.find_one(&404).unwrap(), None);
        assert!(!fx.comments.exists(&404).unwrap());
    });
}

#[test]
fn multiple_comments_of_same_user_sort_ascending() {
    for_each_backend(|fx| {
        let first = fx.save_comment(&fx.some_user, "First comment", 3);
        let second = fx.save_comment(&fx.some_user, "Second comment", 2);
        let third = fx.save_comment(&fx.some_user, "Third comment", 1);

        let all = fx
            .comments
            .find_all_sorted(&Sort::by(Direction::Asc, ["favourite_count"]))
            .unwrap();
        assert_eq!(all, vec![third, second, first]);
    });
}

#[test]
fn comments_of_different_users_sort_descending() {
    for_each_backend(|fx| {
        let first_user = fx.users.save(User::new("First user", SOME_DATE, 10, false)).unwrap();
        let second_user = fx.users.save(User::new("Second user", SOME_DATE, 20, false)).unwrap();
        let third_user = fx.users.save(User::new("Third user", SOME_DATE, 30, false)).unwrap();

        let first = fx.save_comment(&first_user, "First comment", 3);
        let second = fx.save_comment(&second_user, "Second comment", 2);
        let third = fx.save_comment(&third_user, "Third comment", 1);

        let all = fx
            .comments
            .find_all_sorted(&Sort::from(Order::desc("favourite_count")))
            .unwrap();
        assert_eq!(all, vec![first.clone(), second, third]);
        assert_eq!(all[0].user.as_ref(), Some(&first_user));
    });
}

#[test]
fn first_page_with_users() {
    for_each_backend(|fx| {
        let first = fx.save_comment(&fx.some_user, "First comment", 3);
        let second = fx.save_comment(&fx.some_user, "Second comment", 2);
        fx.save_comment(&fx.some_user, "Third comment", 1);

        let request = PageRequest::new(0, 2, Sort::by(Direction::Asc, ["contents"])).unwrap();
        let page = fx.comments.find_page(&request).unwrap();

        assert_eq!(page.total_elements(), 3);
        assert_eq!(page.total_pages(), 2);
        assert_eq!(page.content(), &[first, second]);
        assert!(page.has_next());
    });
}

#[test]
fn second_page_with_users() {
    for_each_backend(|fx| {
        fx.save_comment(&fx.some_user, "First comment", 3);
        fx.save_comment(&fx.some_user, "Second comment", 2);
        let third = fx.save_comment(&fx.some_user, "Third comment", 1);

        let request = PageRequest::new(1, 2, Sort::by(Direction::Asc, ["contents"])).unwrap();
        let page = fx.comments.find_page(&request).unwrap();

        assert_eq!(page.total_elements(), 3);
        assert_eq!(page.total_pages(), 2);
        assert_eq!(page.content(), &[third]);
        assert!(page.is_last());
    });
}

#[test]
fn delete_comment_keeps_user() {
    for_each_backend(|fx| {
        let comment = fx.save_comment(&fx.some_user, "First comment", 3);

        fx.comments.delete(&comment).unwrap();

        assert_eq!(fx.comments.count().unwrap(), 0);
        assert!(fx.users.exists(&SOME_USER.to_string()).unwrap());
    });
}

#[test]
fn update_comment_by_attaching_different_user() {
    for_each_backend(|fx| {
        let first_user = fx.users.save(User::new("First user", SOME_DATE, 10, false)).unwrap();
        let mut comment = fx.save_comment(&fx.some_user, "First comment", 3);

        comment.user = Some(first_user.clone());
        fx.comments.save(comment.clone()).unwrap();

        assert_eq!(fx.comments.count().unwrap(), 1);
        let found = fx.comments.find_one(&comment.id.unwrap()).unwrap().unwrap();
        assert_eq!(found.user, Some(first_user));
    });
}

#[test]
fn delete_all_comments_keeps_users() {
    for_each_backend(|fx| {
        let other = fx.users.save(User::new("Other user", SOME_DATE, 5, true)).unwrap();
        fx.save_comment(&fx.some_user, "First comment", 3);
        fx.save_comment(&fx.some_user, "Second comment", 2);
        fx.save_comment(&other, "Third comment", 1);

        assert_eq!(fx.comments.delete_all().unwrap(), 3);

        assert_eq!(fx.comments.count().unwrap(), 0);
        assert!(fx.users.exists(&SOME_USER.to_string()).unwrap());
        assert!(fx.users.exists(&other.user_name).unwrap());
        assert_eq!(fx.users.count().unwrap(), 2);
    });
}

#[test]
fn comment_without_user_maps_to_absent_association() {
    for_each_backend(|fx| {
        let orphan = CommentWithUser {
            user: None,
            ..CommentWithUser::new(&fx.some_user, "Anonymous", SOME_TIMESTAMP, 0)
        };
        let saved = fx.comments.save(orphan).unwrap();

        let found = fx.comments.find_one(&saved.id.unwrap()).unwrap().unwrap();
        assert_eq!(found.user, None);
        assert_eq!(found, saved);
    });
}

#[test]
fn detaching_user_clears_foreign_key() {
    for_each_backend(|fx| {
        let mut comment = fx.save_comment(&fx.some_user, "Detach me", 1);
        comment.user = None;
        fx.comments.save(comment.clone()).unwrap();

        let found = fx.comments.find_one(&comment.id.unwrap()).unwrap().unwrap();
        assert_eq!(found.user, None);
    });
}
